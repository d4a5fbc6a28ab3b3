//! 二值结果间隔重复算法
//!
//! 纯函数：`(当前状态, 结果, now) -> 新状态`，不做任何 I/O。
//!
//! - 失败：连续错误 +1，≥3 进入 leech，否则回到 learning；间隔清零；难度系数 -0.2（下限 1.3）
//! - 成功：连续错误清零；new → learning(1 天)，learning → review(3 天)，
//!   review / leech → review，间隔 0→1、1→3、其余 ceil(interval × EF)

use chrono::{DateTime, Duration, Utc};

use super::state::{ItemStatus, Outcome, SchedulingState, LEECH_THRESHOLD, MIN_EASE_FACTOR};

/// 每次失败扣减的难度系数
const EASE_PENALTY: f64 = 0.2;

/// 标记「已掌握」时的最小间隔（天）
pub const KNOWN_INTERVAL_DAYS: u32 = 7;

/// 间隔上限（约 100 年），保证到期时间可表示
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// 根据一次作答结果推进调度状态
pub fn advance(state: &SchedulingState, outcome: Outcome, now: DateTime<Utc>) -> SchedulingState {
    let mut next = state.clone();

    match outcome {
        Outcome::Fail => {
            next.consecutive_mistakes = state.consecutive_mistakes.saturating_add(1);
            next.status = if next.consecutive_mistakes >= LEECH_THRESHOLD {
                ItemStatus::Leech
            } else {
                ItemStatus::Learning
            };
            next.interval = 0;
            next.ease_factor = clamp_ease(state.ease_factor - EASE_PENALTY);
        }
        Outcome::Success => {
            next.consecutive_mistakes = 0;
            match state.status {
                ItemStatus::New => {
                    next.status = ItemStatus::Learning;
                    next.interval = 1;
                }
                ItemStatus::Learning => {
                    next.status = ItemStatus::Review;
                    next.interval = 3;
                }
                ItemStatus::Review | ItemStatus::Leech => {
                    next.status = ItemStatus::Review;
                    next.interval = grow_interval(state.interval, state.ease_factor);
                }
            }
        }
    }

    next.next_review_at = due_after(now, next.interval);
    next
}

/// 学习者声明已掌握：直接毕业到 review，间隔至少 7 天，难度系数不变
pub fn mark_known(state: &SchedulingState, now: DateTime<Utc>) -> SchedulingState {
    let interval = state.interval.clamp(KNOWN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);
    SchedulingState {
        status: ItemStatus::Review,
        interval,
        ease_factor: state.ease_factor,
        next_review_at: due_after(now, interval),
        consecutive_mistakes: 0,
    }
}

fn grow_interval(interval: u32, ease_factor: f64) -> u32 {
    match interval {
        0 => 1,
        1 => 3,
        n if n >= MAX_INTERVAL_DAYS => MAX_INTERVAL_DAYS,
        n => {
            // 消除浮点误差后再向上取整，避免 2.3 × 10 得到 24
            let raw = n as f64 * ease_factor - 1e-9;
            raw.ceil().min(MAX_INTERVAL_DAYS as f64) as u32
        }
    }
}

fn clamp_ease(ease: f64) -> f64 {
    ease.max(MIN_EASE_FACTOR)
}

fn due_after(now: DateTime<Utc>, interval: u32) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(interval.min(MAX_INTERVAL_DAYS) as i64))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// 将天数格式化为简短文本
pub fn format_interval(days: u32) -> String {
    match days {
        0 => "now".to_string(),
        1..=6 => format!("{}d", days),
        7..=29 => format!("{}w", days / 7),
        30..=364 => format!("{}mo", days / 30),
        _ => format!("{}y", days / 365),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn review_state(interval: u32, ease: f64) -> SchedulingState {
        SchedulingState {
            status: ItemStatus::Review,
            interval,
            ease_factor: ease,
            next_review_at: now(),
            consecutive_mistakes: 0,
        }
    }

    #[test]
    fn test_success_ladder_from_new() {
        let s0 = SchedulingState::new(now());
        let s1 = advance(&s0, Outcome::Success, now());
        assert_eq!((s1.status, s1.interval), (ItemStatus::Learning, 1));
        let s2 = advance(&s1, Outcome::Success, now());
        assert_eq!((s2.status, s2.interval), (ItemStatus::Review, 3));
        let s3 = advance(&s2, Outcome::Success, now());
        assert_eq!((s3.status, s3.interval), (ItemStatus::Review, 8));
        assert_eq!(s3.next_review_at, now() + Duration::days(8));
    }

    #[test]
    fn test_three_fails_make_leech() {
        let mut s = review_state(8, 2.5);
        for _ in 0..3 {
            s = advance(&s, Outcome::Fail, now());
        }
        assert_eq!(s.status, ItemStatus::Leech);
        assert_eq!(s.interval, 0);
        assert_eq!(s.consecutive_mistakes, 3);
        assert!((s.ease_factor - 1.9).abs() < 1e-9);
        assert_eq!(s.next_review_at, now());
    }

    #[test]
    fn test_first_fail_demotes_to_learning() {
        let s = advance(&review_state(20, 2.5), Outcome::Fail, now());
        assert_eq!(s.status, ItemStatus::Learning);
        assert_eq!(s.consecutive_mistakes, 1);
        assert!((s.ease_factor - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_ease_never_below_minimum() {
        let mut s = SchedulingState::new(now());
        for i in 0..40 {
            let outcome = if i % 5 == 4 { Outcome::Success } else { Outcome::Fail };
            s = advance(&s, outcome, now());
            assert!(s.ease_factor >= MIN_EASE_FACTOR);
        }
        assert!((s.ease_factor - MIN_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_leech_success_returns_to_review() {
        let mut s = review_state(0, 1.9);
        s.status = ItemStatus::Leech;
        s.consecutive_mistakes = 3;
        let next = advance(&s, Outcome::Success, now());
        assert_eq!(next.status, ItemStatus::Review);
        assert_eq!(next.interval, 1);
        assert_eq!(next.consecutive_mistakes, 0);
        let again = advance(&next, Outcome::Success, now());
        assert_eq!(again.interval, 3);
    }

    #[test]
    fn test_interval_growth_has_no_float_drift() {
        let s = advance(&review_state(10, 2.3), Outcome::Success, now());
        assert_eq!(s.interval, 23);
        let s = advance(&review_state(10, 2.1), Outcome::Success, now());
        assert_eq!(s.interval, 21);
    }

    #[test]
    fn test_huge_interval_is_capped() {
        let s = advance(&review_state(40_000_000, 2.5), Outcome::Success, now());
        assert_eq!(s.interval, MAX_INTERVAL_DAYS);
        assert_eq!(s.next_review_at, now() + Duration::days(MAX_INTERVAL_DAYS as i64));

        let s = advance(&review_state(u32::MAX, 2.5), Outcome::Success, now());
        assert_eq!(s.interval, MAX_INTERVAL_DAYS);

        let known = mark_known(&review_state(u32::MAX, 2.5), now());
        assert_eq!(known.interval, MAX_INTERVAL_DAYS);

        let s = advance(&review_state(20_000, 2.5), Outcome::Success, now());
        assert_eq!(s.interval, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_ease_penalty_keeps_precision() {
        let s = advance(&review_state(10, 2.457), Outcome::Fail, now());
        assert!((s.ease_factor - 2.257).abs() < 1e-9);
    }

    #[test]
    fn test_mark_known_graduates_item() {
        let s = mark_known(&SchedulingState::new(now()), now());
        assert_eq!(s.status, ItemStatus::Review);
        assert_eq!(s.interval, KNOWN_INTERVAL_DAYS);
        let long = mark_known(&review_state(40, 2.5), now());
        assert_eq!(long.interval, 40);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "now");
        assert_eq!(format_interval(3), "3d");
        assert_eq!(format_interval(14), "2w");
        assert_eq!(format_interval(90), "3mo");
        assert_eq!(format_interval(730), "2y");
    }
}

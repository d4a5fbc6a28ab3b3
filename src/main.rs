//! Lexi - Rust 词汇学习引擎
//!
//! 入口：初始化日志、（可选）导入词汇、创建引擎运行时，并运行逐行交互的主循环。
//!
//! 用法：`lexi [import <file.json>] [learn|review]`

use std::path::PathBuf;

use anyhow::{bail, Context};
use lexi::config::{load_config, AppConfig};
use lexi::core::{
    create_generator_from_config, create_store_from_config, spawn_engine, Command, EngineStatus,
    Engine, SessionView,
};
use lexi::scheduler::Outcome;
use lexi::session::{Direction, SessionMode};
use lexi::store::{import_items, load_import_file};
use tokio::io::{AsyncBufReadExt, BufReader};

struct Args {
    import: Option<PathBuf>,
    mode: SessionMode,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        import: None,
        mode: SessionMode::Learning,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "import" => {
                let path = iter.next().context("import needs a JSON file path")?;
                args.import = Some(PathBuf::from(path));
            }
            "learn" => args.mode = SessionMode::Learning,
            "review" => args.mode = SessionMode::ReviewOnly,
            other => bail!("unknown argument: {other} (usage: lexi [import <file.json>] [learn|review])"),
        }
    }
    Ok(args)
}

/// 作答比对：忽略大小写与首尾空白，释义可用 , ; / 分隔多个可接受答案
fn matches_answer(input: &str, expected: &str) -> bool {
    let input = input.trim().to_lowercase();
    !input.is_empty()
        && expected
            .split(|c: char| matches!(c, ',' | ';' | '/'))
            .any(|candidate| candidate.trim().to_lowercase() == input)
}

fn render(view: &SessionView) {
    if let Some(err) = &view.error_message {
        println!("! {err}");
    }
    match view.status {
        EngineStatus::Idle => println!("No session."),
        EngineStatus::Intro => println!(
            "Session ready: {} batch(es). Press Enter to begin.",
            view.batch_count
        ),
        EngineStatus::Warmup => {
            if let Some(card) = &view.warmup {
                println!(
                    "[warm-up {}/{}] {} = {}",
                    card.index + 1,
                    card.total,
                    card.item.payload.display_form(),
                    card.item.payload.translation()
                );
                if let Some(m) = &card.item.mnemonic {
                    println!("  mnemonic: {m}");
                }
                println!("  Enter to continue, /mnemonic <text> to edit.");
            }
        }
        EngineStatus::Priming => {
            if let Some(card) = &view.card {
                println!("[new] {} = {}", card.display, card.translation);
                if let Some(m) = &card.mnemonic {
                    println!("  mnemonic: {m}");
                }
                println!("  Enter to continue, /known if you already know it.");
            }
        }
        EngineStatus::Recognition => {
            if let Some(card) = &view.card {
                match card.direction {
                    Some(Direction::Reverse) => println!("[recall] {} → ?", card.translation),
                    _ => println!("[meaning] {} → ?", card.display),
                }
            }
        }
        EngineStatus::Narrative => {
            if let Some(text) = &view.content {
                println!("\n{text}\n");
            }
            println!("Press Enter to continue.");
        }
        EngineStatus::Production => {
            if let (Some(card), Some(text)) = (&view.card, &view.content) {
                println!("[write] {text}");
                println!("  ({})", card.translation);
            }
        }
        EngineStatus::Loading => println!("…generating"),
        EngineStatus::Failed => println!("Generation failed. /retry to try again."),
        EngineStatus::Consolidation => {
            if let Some(summary) = &view.summary {
                for line in &summary.lines {
                    let mark = match line.outcome {
                        Outcome::Success => "✓",
                        Outcome::Fail => "✗",
                    };
                    println!(
                        "  {mark} {} (next: {})",
                        line.lemma,
                        line.next_review.as_deref().unwrap_or("-")
                    );
                }
            }
            if view.pending_writes > 0 {
                println!("  {} write(s) not yet saved", view.pending_writes);
            }
            println!("Press Enter to finish.");
        }
        EngineStatus::Closed => {
            if let Some(summary) = &view.summary {
                println!(
                    "Done: {} correct, {} missed, {} marked known.",
                    summary.successes, summary.failures, summary.known
                );
            }
        }
    }
}

/// 把一行输入翻译成命令；None 表示输入无效，重新读取
fn to_command(line: &str, view: &SessionView) -> Option<Command> {
    let line = line.trim();
    if line == "/quit" {
        return Some(Command::Quit);
    }
    if line == "/retry" {
        return Some(Command::Retry);
    }
    if line == "/known" {
        return Some(Command::MarkKnown);
    }
    if let Some(text) = line.strip_prefix("/mnemonic ") {
        return Some(Command::EditMnemonic(text.to_string()));
    }

    match view.status {
        EngineStatus::Recognition => {
            let card = view.card.as_ref()?;
            let expected = match card.direction {
                Some(Direction::Reverse) => card.lemma.as_str(),
                _ => card.translation.as_str(),
            };
            let correct = matches_answer(line, expected);
            if !correct {
                println!("  → {}", expected);
            }
            Some(Command::Answer(Outcome::from_correct(correct)))
        }
        EngineStatus::Production => {
            let card = view.card.as_ref()?;
            println!("  → {}", card.display);
            Some(Command::AnswerText(line.to_string()))
        }
        EngineStatus::Failed => Some(Command::Retry),
        EngineStatus::Loading | EngineStatus::Idle | EngineStatus::Closed => None,
        _ => Some(Command::Acknowledge),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    lexi::observability::init();

    let args = parse_args()?;
    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let store = create_store_from_config(&cfg).context("Failed to open store")?;

    if let Some(path) = &args.import {
        let items = load_import_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let report = import_items(store.as_ref(), &cfg.app.user_id, items)
            .await
            .context("Import failed")?;
        println!(
            "Imported {} item(s) ({} duplicate, {} incomplete).",
            report.imported, report.duplicates, report.placeholders
        );
    }

    let generator = create_generator_from_config(&cfg);
    let (cmd_tx, mut state_rx) = spawn_engine(Engine::new(store, generator, &cfg));

    cmd_tx
        .send(Command::Start(args.mode))
        .context("Engine stopped")?;
    state_rx.changed().await.context("Engine stopped")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let view = state_rx.borrow_and_update().clone();
        render(&view);
        if view.status == EngineStatus::Closed || view.status == EngineStatus::Idle {
            break;
        }

        let command = loop {
            let Some(line) = lines.next_line().await? else {
                break Command::Quit;
            };
            if let Some(cmd) = to_command(&line, &view) {
                break cmd;
            }
        };
        let quit = matches!(command, Command::Quit);
        cmd_tx.send(command).context("Engine stopped")?;
        if quit {
            // 等待后台任务写完待重试队列后退出
            let _ = state_rx.changed().await;
            break;
        }
        state_rx.changed().await.context("Engine stopped")?;
    }

    Ok(())
}

//! 词汇导入
//!
//! 从 JSON 文件读取词条并写入存储。文件格式：
//!
//! ```json
//! { "items": [ { "id": "haus", "level": "A1",
//!                "payload": { "type": "noun", "lemma": "Haus", "translation": "house", "gender": "neuter" } } ] }
//! ```
//!
//! 也接受顶层直接是词条数组。

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::traits::{StoreError, VocabStore};
use crate::vocab::VocabularyItem;

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Wrapped { items: Vec<VocabularyItem> },
    Bare(Vec<VocabularyItem>),
}

/// 导入结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// 文件内重复 ID，只取第一条
    pub duplicates: usize,
    /// 内容不完整、以占位内容写入的条数
    pub placeholders: usize,
}

/// 读取并解析导入文件
pub fn load_import_file(path: impl AsRef<Path>) -> Result<Vec<VocabularyItem>, StoreError> {
    let data = std::fs::read_to_string(path.as_ref())?;
    parse_import(&data)
}

pub fn parse_import(data: &str) -> Result<Vec<VocabularyItem>, StoreError> {
    let file: ImportFile = serde_json::from_str(data)?;
    Ok(match file {
        ImportFile::Wrapped { items } | ImportFile::Bare(items) => items,
    })
}

/// 写入存储：文件内去重，缺失字段替换为占位
pub async fn import_items(
    store: &dyn VocabStore,
    user_id: &str,
    items: Vec<VocabularyItem>,
) -> Result<ImportReport, StoreError> {
    let mut report = ImportReport::default();
    let mut seen = HashSet::new();
    for mut item in items {
        if !seen.insert(item.id.clone()) {
            tracing::warn!(item_id = %item.id, "Duplicate id in import file, skipped");
            report.duplicates += 1;
            continue;
        }
        if item.sanitize() {
            report.placeholders += 1;
        }
        store.add_item(user_id, item).await?;
        report.imported += 1;
    }
    tracing::info!(
        store = store.name(),
        imported = report.imported,
        duplicates = report.duplicates,
        "Vocabulary imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::vocab::LexicalKind;

    const SAMPLE: &str = r#"{
        "items": [
            {"id": "haus", "level": "A1",
             "payload": {"type": "noun", "lemma": "Haus", "translation": "house", "gender": "neuter"}},
            {"id": "warten",
             "payload": {"type": "verb", "lemma": "warten", "translation": "to wait", "governance": "auf + Akk."}},
            {"id": "haus",
             "payload": {"type": "noun", "lemma": "Hause", "translation": "home"}},
            {"id": "leer",
             "payload": {"type": "adjective", "lemma": "", "translation": "empty"}}
        ]
    }"#;

    #[test]
    fn test_parse_wrapped_and_bare() {
        let items = parse_import(SAMPLE).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[1].kind(), LexicalKind::Verb);

        let bare = r#"[{"id": "und", "payload": {"type": "conjunction", "lemma": "und", "translation": "and"}}]"#;
        assert_eq!(parse_import(bare).unwrap()[0].id, "und");
        assert!(matches!(parse_import("{"), Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn test_import_dedupes_and_sanitizes() {
        let store = InMemoryStore::new();
        let report = import_items(&store, "u1", parse_import(SAMPLE).unwrap())
            .await
            .unwrap();
        assert_eq!(
            report,
            ImportReport {
                imported: 3,
                duplicates: 1,
                placeholders: 1
            }
        );
        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].item.payload.lemma(), "Haus");
    }

    #[tokio::test]
    async fn test_load_import_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_import_file(&path).unwrap().len(), 4);
        assert!(matches!(
            load_import_file(dir.path().join("missing.json")),
            Err(StoreError::Io(_))
        ));
    }
}

use crate::db::*;
use crate::types::{CaptionUpdate, DocumentId, SkipStage, SkippedDocument};
use tempfile::NamedTempFile;


async fn seeded(ids: &[&str]) -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    for id in ids {
        db.insert_document(&DocumentId::new(id)).await.unwrap();
    }
    (temp_file, db)
}

fn update(doc_id: &str, caption: &str) -> CaptionUpdate {
    CaptionUpdate {
        doc_id: DocumentId::new(doc_id),
        caption: caption.to_string(),
    }
}

fn skipped(doc_id: &str, reason: &str) -> SkippedDocument {
    SkippedDocument {
        doc_id: DocumentId::new(doc_id),
        stage: SkipStage::Retrieval,
        reason: reason.to_string(),
    }
}

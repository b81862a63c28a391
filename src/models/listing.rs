use chrono::NaiveDateTime;
use serde::Serialize;

use super::FileRecord;

/// Coarse file type bucket shown in listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Document => "document",
            FileCategory::Other => "other",
        }
    }

    /// Bucket for a MIME type such as `image/png` or `text/plain; charset=utf-8`
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let (top, sub) = essence.split_once('/').unwrap_or((essence.as_str(), ""));

        match top {
            "image" => FileCategory::Image,
            "video" => FileCategory::Video,
            "audio" => FileCategory::Audio,
            "text" => FileCategory::Document,
            "application" if is_document_subtype(sub) => FileCategory::Document,
            _ => FileCategory::Other,
        }
    }

    /// Bucket for a stored file, guessing from the filename when no type was recorded
    pub fn for_file(filetype: &str, filename: &str) -> Self {
        if !filetype.trim().is_empty() {
            return Self::from_mime(filetype);
        }

        mime_guess::from_path(filename)
            .first()
            .map(|mime| Self::from_mime(mime.essence_str()))
            .unwrap_or(FileCategory::Other)
    }
}

fn is_document_subtype(sub: &str) -> bool {
    matches!(
        sub,
        "pdf" | "msword" | "rtf" | "x-rtf" | "markdown" | "vnd.ms-excel" | "vnd.ms-powerpoint"
    ) || sub.starts_with("vnd.openxmlformats-officedocument")
        || sub.starts_with("vnd.oasis.opendocument")
}

/// A file as presented in an owner's listing
#[derive(Debug, Clone, Serialize)]
pub struct ListedFile {
    pub id: i64,
    pub filename: String,
    pub directory: String,
    pub owner: String,
    pub filesize: i64,
    pub filetype: String,
    pub timestamp: NaiveDateTime,
    pub hashedname: String,
    /// Whole days left before the file is considered stale; zero or less once expired
    pub days_remaining: i64,
    pub category: FileCategory,
}

impl ListedFile {
    pub fn new(record: FileRecord, now: NaiveDateTime, max_age_days: i64) -> Self {
        // A timestamp ahead of `now` (clock skew) counts as zero days old
        let age_days = (now - record.timestamp).num_days().max(0);
        let category = FileCategory::for_file(&record.filetype, &record.filename);

        Self {
            id: record.id,
            filename: record.filename,
            directory: record.directory,
            owner: record.owner,
            filesize: record.filesize,
            filetype: record.filetype,
            timestamp: record.timestamp,
            hashedname: record.hashedname,
            days_remaining: max_age_days - age_days,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn record(filename: &str, filetype: &str, timestamp: NaiveDateTime) -> FileRecord {
        FileRecord {
            id: 1,
            filename: filename.to_string(),
            directory: format!("user/{}", filename),
            owner: "user".to_string(),
            filesize: 1000,
            filetype: filetype.to_string(),
            timestamp,
            hashedname: "abc".to_string(),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_categories() {
        assert_eq!(FileCategory::from_mime("image/jpeg"), FileCategory::Image);
        assert_eq!(FileCategory::from_mime("VIDEO/mp4"), FileCategory::Video);
        assert_eq!(FileCategory::from_mime("audio/ogg"), FileCategory::Audio);
        assert_eq!(FileCategory::from_mime("application/pdf"), FileCategory::Document);
        assert_eq!(
            FileCategory::from_mime("text/plain; charset=utf-8"),
            FileCategory::Document
        );
        assert_eq!(
            FileCategory::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            FileCategory::Document
        );
        assert_eq!(FileCategory::from_mime("application/zip"), FileCategory::Other);
        assert_eq!(FileCategory::from_mime("garbage"), FileCategory::Other);
    }

    #[test]
    fn test_category_guessed_from_filename() {
        assert_eq!(FileCategory::for_file("", "holiday.png"), FileCategory::Image);
        assert_eq!(FileCategory::for_file("", "notes"), FileCategory::Other);
        // A recorded type wins over the extension
        assert_eq!(FileCategory::for_file("video/webm", "clip.png"), FileCategory::Video);
    }

    #[test]
    fn test_days_remaining() {
        let now = noon();

        let fresh = ListedFile::new(record("a.jpg", "image/jpeg", now), now, 7);
        assert_eq!(fresh.days_remaining, 7);
        assert_eq!(fresh.category, FileCategory::Image);

        // Partial days are floored
        let older = now - Duration::days(2) - Duration::hours(23);
        let listed = ListedFile::new(record("b.pdf", "application/pdf", older), now, 7);
        assert_eq!(listed.days_remaining, 5);

        let expired = now - Duration::days(9);
        let listed = ListedFile::new(record("c.txt", "text/plain", expired), now, 7);
        assert_eq!(listed.days_remaining, -2);

        let future = now + Duration::hours(3);
        let listed = ListedFile::new(record("d.txt", "text/plain", future), now, 3);
        assert_eq!(listed.days_remaining, 3);
    }

    #[test]
    fn test_serializes_category_lowercase() {
        let now = noon();
        let listed = ListedFile::new(record("report.pdf", "application/pdf", now), now, 7);
        let json = serde_json::to_value(&listed).unwrap();
        assert_eq!(json["category"], "document");
        assert_eq!(json["days_remaining"], 7);
        assert_eq!(json["filename"], "report.pdf");
    }
}

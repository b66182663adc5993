use async_trait::async_trait;
use libsql::{Builder, Connection, Database as LibsqlDatabase, OpenFlags};
use std::path::Path;

use crate::error::SourceError;
use crate::model::{Book, Highlight};

/// Read-only view over the e-reader's highlight records.
#[async_trait]
pub trait HighlightSource: Send + Sync {
    /// Books with at least one bookmark, distinct by content id, ordered by title.
    async fn list_books(&self) -> Result<Vec<Book>, SourceError>;

    /// Highlights of one book, most recently created first.
    async fn list_highlights(&self, content_id: &str) -> Result<Vec<Highlight>, SourceError>;
}

const LIST_BOOKS_QUERY: &str = r#"
    SELECT DISTINCT content.ContentID, content.Title, content.Attribution
    FROM Bookmark INNER JOIN content ON Bookmark.VolumeID = content.ContentID
    ORDER BY content.Title
"#;

const LIST_HIGHLIGHTS_QUERY: &str = r#"
    SELECT Bookmark.Text, Bookmark.Color
    FROM Bookmark INNER JOIN content ON Bookmark.VolumeID = content.ContentID
    WHERE content.ContentID = ?
    ORDER BY Bookmark.DateCreated DESC
"#;

/// A Kobo `KoboReader.sqlite` export, opened once for the whole run.
pub struct KoboDatabase {
    _db: LibsqlDatabase,
    conn: Connection,
}

impl KoboDatabase {
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        // libsql would happily create an empty file and report zero books.
        if !path.exists() {
            return Err(SourceError::Missing(path.to_path_buf()));
        }

        let db = Builder::new_local(path)
            .flags(OpenFlags::SQLITE_OPEN_READ_ONLY)
            .build()
            .await
            .map_err(SourceError::Open)?;
        tracing::info!(path = ?path, "opened highlight database");
        Self::from_database(db)
    }

    pub fn from_database(db: LibsqlDatabase) -> Result<Self, SourceError> {
        let conn = db.connect().map_err(SourceError::Open)?;
        Ok(Self { _db: db, conn })
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn row_to_book(row: &libsql::Row) -> Result<Book, SourceError> {
        Ok(Book {
            content_id: row.get(0)?,
            title: row.get::<Option<String>>(1)?.unwrap_or_default(),
            author: row.get::<Option<String>>(2)?.unwrap_or_default(),
        })
    }

    fn row_to_highlight(row: &libsql::Row) -> Result<Highlight, SourceError> {
        Ok(Highlight {
            text: row.get(0)?,
            color: row.get(1)?,
        })
    }
}

#[async_trait]
impl HighlightSource for KoboDatabase {
    async fn list_books(&self) -> Result<Vec<Book>, SourceError> {
        let mut rows = self.conn.query(LIST_BOOKS_QUERY, ()).await?;

        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }
        Ok(books)
    }

    async fn list_highlights(&self, content_id: &str) -> Result<Vec<Highlight>, SourceError> {
        let mut rows = self
            .conn
            .query(LIST_HIGHLIGHTS_QUERY, libsql::params![content_id])
            .await?;

        let mut highlights = Vec::new();
        while let Some(row) = rows.next().await? {
            highlights.push(Self::row_to_highlight(&row)?);
        }
        Ok(highlights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KOBO_SCHEMA: &str = r#"
        CREATE TABLE content (
            ContentID TEXT PRIMARY KEY,
            Title TEXT,
            Attribution TEXT,
            DateCreated TEXT
        );
        CREATE TABLE Bookmark (
            BookmarkID TEXT PRIMARY KEY,
            VolumeID TEXT NOT NULL,
            Text TEXT,
            Color INTEGER,
            DateCreated TEXT
        );
    "#;

    async fn kobo_db() -> KoboDatabase {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        let kobo = KoboDatabase::from_database(db).unwrap();
        kobo.connection().execute_batch(KOBO_SCHEMA).await.unwrap();
        kobo
    }

    async fn add_book(kobo: &KoboDatabase, id: &str, title: &str, author: Option<&str>) {
        kobo.connection()
            .execute(
                "INSERT INTO content (ContentID, Title, Attribution) VALUES (?, ?, ?)",
                libsql::params![id, title, author],
            )
            .await
            .unwrap();
    }

    async fn add_bookmark(
        kobo: &KoboDatabase,
        id: &str,
        volume: &str,
        text: Option<&str>,
        color: Option<i64>,
        created: &str,
    ) {
        kobo.connection()
            .execute(
                "INSERT INTO Bookmark (BookmarkID, VolumeID, Text, Color, DateCreated) VALUES (?, ?, ?, ?, ?)",
                libsql::params![id, volume, text, color, created],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_books_distinct_and_ordered_by_title() {
        let kobo = kobo_db().await;
        add_book(&kobo, "file:///dune.epub", "Dune", Some("Frank Herbert")).await;
        add_book(&kobo, "file:///anathem.epub", "Anathem", Some("Neal Stephenson")).await;
        add_book(&kobo, "file:///unread.epub", "Unread", Some("Nobody")).await;
        add_bookmark(&kobo, "b1", "file:///dune.epub", Some("one"), Some(0), "2026-01-01T00:00:00").await;
        add_bookmark(&kobo, "b2", "file:///dune.epub", Some("two"), Some(1), "2026-01-02T00:00:00").await;
        add_bookmark(&kobo, "b3", "file:///anathem.epub", Some("three"), Some(2), "2026-01-03T00:00:00").await;

        let books = kobo.list_books().await.unwrap();

        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Anathem", "Dune"]);
        assert_eq!(books[1].content_id, "file:///dune.epub");
        assert_eq!(books[1].author, "Frank Herbert");
    }

    #[tokio::test]
    async fn test_missing_author_becomes_empty() {
        let kobo = kobo_db().await;
        add_book(&kobo, "c1", "Anonymous Work", None).await;
        add_bookmark(&kobo, "b1", "c1", Some("text"), Some(0), "2026-01-01T00:00:00").await;

        let books = kobo.list_books().await.unwrap();

        assert_eq!(books.len(), 1);
        assert_eq!(books[0].author, "");
    }

    #[tokio::test]
    async fn test_list_highlights_newest_first_with_nulls() {
        let kobo = kobo_db().await;
        add_book(&kobo, "c1", "Dune", Some("Frank Herbert")).await;
        add_book(&kobo, "c2", "Other", Some("Someone")).await;
        add_bookmark(&kobo, "b1", "c1", Some("oldest"), Some(0), "2026-01-01T08:00:00").await;
        add_bookmark(&kobo, "b2", "c1", None, None, "2026-01-02T08:00:00").await;
        add_bookmark(&kobo, "b3", "c1", Some("newest"), Some(3), "2026-01-03T08:00:00").await;
        add_bookmark(&kobo, "b4", "c2", Some("elsewhere"), Some(1), "2026-01-04T08:00:00").await;

        let highlights = kobo.list_highlights("c1").await.unwrap();

        assert_eq!(
            highlights,
            vec![
                Highlight { text: Some("newest".to_string()), color: Some(3) },
                Highlight { text: None, color: None },
                Highlight { text: Some("oldest".to_string()), color: Some(0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_open_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KoboReader.sqlite");
        {
            let db = Builder::new_local(&path).build().await.unwrap();
            let writable = KoboDatabase::from_database(db).unwrap();
            writable.connection().execute_batch(KOBO_SCHEMA).await.unwrap();
            add_book(&writable, "c1", "Dune", Some("Frank Herbert")).await;
            add_bookmark(&writable, "b1", "c1", Some("text"), Some(0), "2026-01-01T00:00:00").await;
        }

        let kobo = KoboDatabase::open(&path).await.unwrap();

        assert_eq!(kobo.list_books().await.unwrap().len(), 1);
        let write = kobo
            .connection()
            .execute("DELETE FROM Bookmark", ())
            .await;
        assert!(write.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_an_error() {
        let result = KoboDatabase::open(Path::new("/nonexistent/KoboReader.sqlite")).await;

        assert!(matches!(result, Err(SourceError::Missing(_))));
    }
}

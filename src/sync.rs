use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::chunk::{MAX_BLOCKS_PER_APPEND, chunk};
use crate::error::{RemoteError, SourceError, SyncError};
use crate::model::{Block, Book, NewPage};
use crate::notion::RemoteStore;
use crate::source::HighlightSource;
use crate::throttle::Throttle;
use crate::unpack_error;

/// Where a book stands in the remote store at the start of its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookState {
    NotFound,
    Incomplete(String),
    Complete,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub appended: usize,
    pub failed_chunks: usize,
    pub completed: bool,
}

pub enum SyncResult {
    Created(ExportReport),
    Resumed(ExportReport),
    Skipped,
}

impl SyncResult {
    pub fn record(self, stats: &mut SyncStats) {
        let report = match self {
            SyncResult::Created(report) => {
                stats.created += 1;
                report
            }
            SyncResult::Resumed(report) => {
                stats.resumed += 1;
                report
            }
            SyncResult::Skipped => {
                stats.skipped += 1;
                return;
            }
        };

        stats.highlights_appended += report.appended;
        stats.failed_chunks += report.failed_chunks;
        if !report.completed {
            stats.left_incomplete += 1;
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub resumed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub highlights_appended: usize,
    pub failed_chunks: usize,
    pub left_incomplete: usize,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub chunk_size: NonZeroUsize,
    /// Withhold the completion flag when any chunk failed to append.
    pub strict_completion: bool,
    pub export_date: NaiveDate,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_BLOCKS_PER_APPEND,
            strict_completion: false,
            export_date: Local::now().date_naive(),
        }
    }
}

pub fn heading_text(date: NaiveDate) -> String {
    format!("Highlights - {}", date.format("%-m/%-d/%Y"))
}

fn log_remote_error(action: &str, book: &Book, e: &RemoteError) {
    if e.is_rate_limited() {
        tracing::warn!(title = %book.title, "rate limited while trying to {}", action);
    }
    tracing::error!(title = %book.title, error = %unpack_error(e), "failed to {}", action);
}

fn log_book_error(book: &Book, e: &SyncError) {
    tracing::error!(
        title = %book.title,
        content_id = %book.content_id,
        error = %unpack_error(e),
        "failed to sync book"
    );
}

pub struct SyncEngine<'a> {
    source: &'a dyn HighlightSource,
    remote: &'a dyn RemoteStore,
    throttle: Throttle,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn HighlightSource,
        remote: &'a dyn RemoteStore,
        throttle: Throttle,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            remote,
            throttle,
            options,
        }
    }

    /// Syncs every book in turn. Only a failure to list the books ends the
    /// run early; a failing book is logged and counted.
    pub async fn run(&self) -> Result<SyncStats, SourceError> {
        let books = self.source.list_books().await?;
        tracing::info!(count = books.len(), "found books with highlights");

        let mut stats = SyncStats::default();
        let mut seen_titles: HashMap<&str, &str> = HashMap::new();

        for book in &books {
            if let Some(first) = seen_titles.get(book.title.as_str()) {
                tracing::warn!(
                    title = %book.title,
                    content_id = %book.content_id,
                    first_content_id = %first,
                    "another book with this title was already synced this run, skipping"
                );
                stats.skipped += 1;
                continue;
            }
            seen_titles.insert(&book.title, &book.content_id);

            match self.sync_book(book).await {
                Ok(result) => result.record(&mut stats),
                Err(e) => {
                    log_book_error(book, &e);
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    pub async fn sync_book(&self, book: &Book) -> Result<SyncResult, SyncError> {
        match self.resolve(book).await? {
            BookState::Complete => {
                tracing::info!(title = %book.title, "highlights already exported, skipped");
                Ok(SyncResult::Skipped)
            }
            BookState::Incomplete(page_id) => {
                tracing::info!(title = %book.title, page_id = %page_id, "resuming export onto existing page");
                let report = self.export(book, &page_id).await?;
                Ok(SyncResult::Resumed(report))
            }
            BookState::NotFound => {
                let page_id = self
                    .throttle
                    .call(self.remote.create_page(&NewPage::from(book)))
                    .await?;
                tracing::info!(title = %book.title, page_id = %page_id, "created page");
                let report = self.export(book, &page_id).await?;
                Ok(SyncResult::Created(report))
            }
        }
    }

    pub async fn resolve(&self, book: &Book) -> Result<BookState, RemoteError> {
        let existing = self.remote.query_pages_by_title(&book.title).await?;
        if existing.is_empty() {
            return Ok(BookState::NotFound);
        }

        let incomplete = self
            .remote
            .query_incomplete_pages_by_title(&book.title)
            .await?;
        Ok(match incomplete.into_iter().next() {
            Some(page_id) => BookState::Incomplete(page_id),
            None => BookState::Complete,
        })
    }

    /// Appends the dated heading and every non-empty highlight to `page_id`,
    /// then marks the page complete. Append failures are logged per chunk and
    /// do not stop the export.
    pub async fn export(&self, book: &Book, page_id: &str) -> Result<ExportReport, SourceError> {
        let heading = Block::Heading(heading_text(self.options.export_date));
        if let Err(e) = self
            .throttle
            .call(self.remote.append_blocks(page_id, std::slice::from_ref(&heading)))
            .await
        {
            log_remote_error("append heading", book, &e);
        }

        let highlights = self.source.list_highlights(&book.content_id).await?;
        let blocks: Vec<Block> = highlights.iter().filter_map(Block::highlight).collect();
        tracing::debug!(
            title = %book.title,
            total = highlights.len(),
            exportable = blocks.len(),
            "loaded highlights"
        );

        let mut report = ExportReport::default();
        for batch in chunk(&blocks, self.options.chunk_size) {
            match self.throttle.call(self.remote.append_blocks(page_id, batch)).await {
                Ok(()) => {
                    report.appended += batch.len();
                    tracing::debug!(title = %book.title, count = batch.len(), "appended highlights");
                }
                Err(e) => {
                    report.failed_chunks += 1;
                    log_remote_error("append highlights", book, &e);
                }
            }
        }

        if self.options.strict_completion && report.failed_chunks > 0 {
            tracing::warn!(
                title = %book.title,
                failed_chunks = report.failed_chunks,
                "leaving page incomplete so the next run resumes it"
            );
            return Ok(report);
        }

        match self.throttle.call(self.remote.set_complete(page_id)).await {
            Ok(()) => {
                report.completed = true;
                tracing::info!(title = %book.title, appended = report.appended, "all highlights exported");
            }
            Err(e) => log_remote_error("mark highlights complete", book, &e),
        }

        Ok(report)
    }
}

use std::time::Duration;

use tracing::debug;

use crate::engine::protocol::ReaderResponse;
use crate::engine::reveal::{RevealEngine, RevealEvent, RevealTiming};
use crate::model::chapter::Chapter;
use crate::model::page::PageRecord;

/// What a reading surface should do after feeding the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    ChapterTitle { title: String, read_time: String },
    PageHeader { page_number: u32, total_pages: u32 },
    /// Newly revealed text, to append to what is already shown.
    Text(String),
    PageEnd,
    /// Send [`ReaderCommand::NextPage`](crate::engine::protocol::ReaderCommand::NextPage).
    RequestNextPage,
}

/// Drives a [`RevealEngine`] from engine responses and elapsed time, and
/// counts pages the reader has finished.
///
/// A page counts as read once the continuation wait after it elapses, so a
/// run of pages with identical text (the fallback passage, say) still makes
/// progress.
pub struct ReadingSession {
    reveal: RevealEngine,
    page_number: Option<u32>,
    printed: usize,
    pages_read: u32,
    page_limit: u32,
}

impl ReadingSession {
    pub fn new(timing: RevealTiming, page_limit: u32) -> Self {
        Self {
            reveal: RevealEngine::new(timing),
            page_number: None,
            printed: 0,
            pages_read: 0,
            page_limit,
        }
    }

    pub fn pages_read(&self) -> u32 {
        self.pages_read
    }

    pub fn is_done(&self) -> bool {
        self.pages_read >= self.page_limit
    }

    pub fn page_number(&self) -> Option<u32> {
        self.page_number
    }

    pub fn reveal(&self) -> &RevealEngine {
        &self.reveal
    }

    pub fn tick(&mut self, elapsed: Duration) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        let events = self.reveal.advance(elapsed);

        let revealed = self.reveal.revealed_len();
        if revealed > self.printed {
            let fresh: String = self
                .reveal
                .revealed_text()
                .chars()
                .skip(self.printed)
                .collect();
            self.printed = revealed;
            out.push(SessionOutput::Text(fresh));
        }

        for event in events {
            match event {
                RevealEvent::Completed => out.push(SessionOutput::PageEnd),
                RevealEvent::NeedMoreContent => {
                    self.pages_read += 1;
                    debug!(pages_read = self.pages_read, "page finished");
                    if !self.is_done() {
                        out.push(SessionOutput::RequestNextPage);
                    }
                }
            }
        }
        out
    }

    /// Apply an engine response. `ConnectionError` is for the caller to
    /// report; it produces no output here.
    pub fn on_response(&mut self, response: ReaderResponse) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        match response {
            ReaderResponse::Started {
                chapter,
                total_pages,
            }
            | ReaderResponse::ChapterCreated {
                chapter,
                total_pages,
            } => self.open_chapter(chapter, total_pages, &mut out),
            ReaderResponse::PageLoaded { page, total_pages } => {
                self.show_page(page, total_pages, &mut out)
            }
            ReaderResponse::ConnectionError(_) | ReaderResponse::StateRefreshed(_) => {}
        }
        out
    }

    fn open_chapter(&mut self, chapter: Chapter, total_pages: u32, out: &mut Vec<SessionOutput>) {
        out.push(SessionOutput::ChapterTitle {
            title: chapter.title,
            read_time: chapter.read_time,
        });
        // A chapter always starts a fresh page, even at the same number.
        self.page_number = None;
        self.show_page(chapter.first_page, total_pages, out);
    }

    fn show_page(&mut self, page: PageRecord, total_pages: u32, out: &mut Vec<SessionOutput>) {
        let header = SessionOutput::PageHeader {
            page_number: page.page_number,
            total_pages,
        };

        if self.page_number != Some(page.page_number) {
            self.page_number = Some(page.page_number);
            self.reveal.restart(page.content);
            self.printed = 0;
            out.push(header);
        } else if self.reveal.set_content(page.content) {
            self.printed = 0;
            out.push(header);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::page::CONTINUATION_PASSAGE;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn session(limit: u32) -> ReadingSession {
        ReadingSession::new(
            RevealTiming {
                tick: ms(20),
                continuation_delay: ms(4000),
            },
            limit,
        )
    }

    fn page(n: u32, content: &str) -> ReaderResponse {
        ReaderResponse::PageLoaded {
            page: PageRecord {
                page_number: n,
                content: content.into(),
                chapter_id: 1,
                is_generated: true,
                next_page_ready: true,
            },
            total_pages: 0,
        }
    }

    fn text_of(out: &[SessionOutput]) -> String {
        out.iter()
            .filter_map(|o| match o {
                SessionOutput::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reveals_text_incrementally_then_asks_for_more() {
        let mut s = session(3);
        s.on_response(page(1, "abcd"));

        assert_eq!(text_of(&s.tick(ms(40))), "ab");
        let out = s.tick(ms(40));
        assert_eq!(text_of(&out), "cd");
        assert!(out.contains(&SessionOutput::PageEnd));

        let out = s.tick(ms(4000));
        assert_eq!(out, vec![SessionOutput::RequestNextPage]);
        assert_eq!(s.pages_read(), 1);
    }

    #[test]
    fn pages_with_identical_text_still_progress() {
        let mut s = session(3);

        for n in 1..=3 {
            let out = s.on_response(page(n, CONTINUATION_PASSAGE));
            assert!(out.contains(&SessionOutput::PageHeader {
                page_number: n,
                total_pages: 0,
            }));

            let out = s.tick(ms(60_000));
            assert_eq!(text_of(&out), CONTINUATION_PASSAGE);
            assert!(out.contains(&SessionOutput::PageEnd));
        }

        assert_eq!(s.pages_read(), 3);
        assert!(s.is_done());
    }

    #[test]
    fn repeated_page_counts_without_a_new_header() {
        let mut s = session(2);
        s.on_response(page(7, "abc"));
        s.tick(ms(60 + 4000));

        assert!(s.on_response(page(7, "abc")).is_empty());
        let out = s.tick(ms(4000));
        assert!(out.is_empty());
        assert!(s.is_done());
    }

    #[test]
    fn limit_stops_next_page_requests() {
        let mut s = session(1);
        s.on_response(page(1, "a"));
        let out = s.tick(ms(20 + 4000));
        assert!(!out.contains(&SessionOutput::RequestNextPage));
        assert!(s.is_done());
    }

    #[test]
    fn chapter_restarts_at_its_first_page() {
        let mut s = session(5);
        s.on_response(page(1, "old"));

        let chapter = Chapter::from_page(PageRecord {
            page_number: 1,
            content: "old".into(),
            chapter_id: 2,
            is_generated: true,
            next_page_ready: false,
        });
        let out = s.on_response(ReaderResponse::ChapterCreated {
            chapter,
            total_pages: 1,
        });

        assert_eq!(
            out,
            vec![
                SessionOutput::ChapterTitle {
                    title: "Chapter 2".into(),
                    read_time: "1 min read".into(),
                },
                SessionOutput::PageHeader {
                    page_number: 1,
                    total_pages: 1,
                },
            ]
        );
        assert_eq!(s.reveal().revealed_len(), 0);
    }
}

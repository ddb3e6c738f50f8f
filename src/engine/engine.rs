use std::sync::mpsc::{Receiver, Sender};

use tracing::{debug, info, warn};

use crate::engine::content_client::ContentClient;
use crate::engine::protocol::{ReaderCommand, ReaderResponse};

/// Command loop that owns the reading position and performs all blocking
/// service calls off the surface's thread.
pub struct ReaderEngine {
    rx: Receiver<ReaderCommand>,
    tx: Sender<ReaderResponse>,
    client: ContentClient,
    current_page: u32,
}

impl ReaderEngine {
    pub fn new(
        client: ContentClient,
        rx: Receiver<ReaderCommand>,
        tx: Sender<ReaderResponse>,
    ) -> Self {
        Self {
            rx,
            tx,
            client,
            current_page: 1,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Runs until every command sender is dropped.
    pub fn run(&mut self) {
        while let Ok(cmd) = self.rx.recv() {
            let Some(response) = self.handle(cmd) else {
                continue;
            };
            if self.tx.send(response).is_err() {
                debug!("reader surface is gone; stopping engine");
                break;
            }
        }
    }

    pub fn handle(&mut self, cmd: ReaderCommand) -> Option<ReaderResponse> {
        match cmd {
            ReaderCommand::Start => match self.client.bootstrap() {
                Ok(chapter) => {
                    self.current_page = chapter.first_page.page_number;
                    Some(ReaderResponse::Started {
                        chapter,
                        total_pages: self.client.total_pages(),
                    })
                }
                Err(e) => Some(ReaderResponse::ConnectionError(e.to_string())),
            },

            ReaderCommand::NextPage => {
                let Some(next) = self.current_page.checked_add(1) else {
                    warn!(page = self.current_page, "already at the last page number");
                    return None;
                };
                Some(self.load(next))
            }

            ReaderCommand::PreviousPage => {
                if self.current_page <= 1 {
                    return None;
                }
                Some(self.load(self.current_page - 1))
            }

            ReaderCommand::GoToPage(n) => Some(self.load(n.max(1))),

            ReaderCommand::NewChapter => {
                let chapter = self.client.generate_new_chapter();
                self.current_page = chapter.first_page.page_number;
                info!(chapter = chapter.id, title = %chapter.title, "new chapter ready");
                Some(ReaderResponse::ChapterCreated {
                    chapter,
                    total_pages: self.client.total_pages(),
                })
            }

            ReaderCommand::RefreshState => {
                Some(ReaderResponse::StateRefreshed(self.client.load_story_state()))
            }
        }
    }

    fn load(&mut self, page_number: u32) -> ReaderResponse {
        info!(page = page_number, "moving to page");
        let page = self.client.get_page(page_number);
        self.current_page = page.page_number;
        self.client.load_story_state();

        ReaderResponse::PageLoaded {
            page,
            total_pages: self.client.total_pages(),
        }
    }
}

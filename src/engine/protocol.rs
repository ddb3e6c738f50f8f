use crate::model::chapter::Chapter;
use crate::model::page::PageRecord;
use crate::model::story_state::StoryState;

pub enum ReaderCommand {
    /// Load state and the current page.
    Start,
    NextPage,
    PreviousPage,
    GoToPage(u32),
    NewChapter,
    RefreshState,
}

#[derive(Debug, Clone)]
pub enum ReaderResponse {
    Started {
        chapter: Chapter,
        total_pages: u32,
    },

    /// The service could not be reached while starting up.
    ConnectionError(String),

    PageLoaded {
        page: PageRecord,
        total_pages: u32,
    },

    ChapterCreated {
        chapter: Chapter,
        total_pages: u32,
    },

    StateRefreshed(Option<StoryState>),
}

use crate::model::page::PageRecord;

const WORDS_PER_MINUTE: usize = 200;

/// Chapter-level view of a page, as shown in chapter menus and toasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: u32,
    pub title: String,
    pub first_page: PageRecord,
    pub word_count: usize,
    pub read_time: String,
}

impl Chapter {
    pub fn from_page(page: PageRecord) -> Self {
        let title = if page.chapter_id == 1 {
            "The Beginning".to_string()
        } else {
            format!("Chapter {}", page.chapter_id)
        };
        Self::titled(page, title)
    }

    pub fn titled(page: PageRecord, title: impl Into<String>) -> Self {
        let word_count = count_words(&page.content);
        Self {
            id: page.chapter_id,
            title: title.into(),
            read_time: read_time(word_count),
            word_count,
            first_page: page,
        }
    }

    /// Shown when the service cannot create a chapter.
    pub fn fallback_new_chapter() -> Self {
        Self::titled(PageRecord::fallback_new_chapter(), "New Beginnings")
    }

    pub fn content(&self) -> &str {
        &self.first_page.content
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `"N min read"`, rounded up, never below one minute for non-empty text.
pub fn read_time(word_count: usize) -> String {
    let minutes = word_count.div_ceil(WORDS_PER_MINUTE);
    format!("{minutes} min read")
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page of story content as delivered by the generation service.
/// Immutable once cached for a chapter epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_number: u32,
    pub content: String,
    pub chapter_id: u32,
    pub is_generated: bool,
    pub next_page_ready: bool,
}

/// Body of `POST /chapter/new/{user_id}`.
///
/// The service sends the opening page of the new chapter plus whatever chapter
/// metadata it has; only the page fields are required.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChapterResponse {
    pub page_number: u32,
    pub content: String,
    pub chapter_id: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl NewChapterResponse {
    /// The opening page never has a successor generated yet.
    pub fn into_page(self) -> PageRecord {
        PageRecord {
            page_number: self.page_number,
            content: self.content,
            chapter_id: self.chapter_id,
            is_generated: true,
            next_page_ready: false,
        }
    }
}

/// Full page listing from `GET /pages/{user_id}`. Diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageListing {
    #[serde(default)]
    pub pages: Vec<PageRecord>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub chapters: BTreeMap<String, serde_json::Value>,
}

/* =========================
   Fallback content
   ========================= */

pub const OPENING_PASSAGE: &str = "In the ancient kingdom of Aethermoor, where magic flowed through the very stones of the earth, a young apprentice discovered a peculiar book that seemed to write itself. As Lyra opened the leather-bound tome, golden letters began to appear on the parchment, telling her own story as it unfolded...\n\nThe book whispered secrets of forgotten spells and warned of a darkness stirring in the northern mountains.";

pub const CONTINUATION_PASSAGE: &str = "The magical journey continued as Lyra delved deeper into the mysteries of Aethermoor. Each turn of the page revealed new wonders and greater challenges that would test her courage and determination.";

pub const NEW_CHAPTER_PASSAGE: &str = "A new chapter in Lyra's journey began as she stepped through the mystical portal, leaving behind everything she had known...";

impl PageRecord {
    /// Deterministic stand-in used whenever a page cannot be fetched.
    pub fn fallback(page_number: u32) -> Self {
        let content = if page_number == 1 {
            OPENING_PASSAGE
        } else {
            CONTINUATION_PASSAGE
        };

        Self {
            page_number,
            content: content.to_string(),
            chapter_id: 1,
            is_generated: true,
            next_page_ready: false,
        }
    }

    /// Opening page of the chapter shown when chapter creation fails.
    pub fn fallback_new_chapter() -> Self {
        Self {
            page_number: 1,
            content: NEW_CHAPTER_PASSAGE.to_string(),
            chapter_id: 2,
            is_generated: true,
            next_page_ready: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn page_response_decodes_from_wire_json() {
        let json = r#"{
            "page_number": 3,
            "content": "The tower trembled.",
            "chapter_id": 1,
            "is_generated": true,
            "next_page_ready": false
        }"#;

        let page: PageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(page.page_number, 3);
        assert_eq!(page.content, "The tower trembled.");
        assert!(!page.next_page_ready);
    }

    #[test]
    fn new_chapter_response_tolerates_extra_metadata() {
        let json = r#"{
            "page_number": 1,
            "content": "Three moons had passed.",
            "chapter_id": 4,
            "title": "The Awakening Power",
            "word_count": 4
        }"#;

        let resp: NewChapterResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.title.as_deref(), Some("The Awakening Power"));

        let page = resp.into_page();
        assert_eq!(page.chapter_id, 4);
        assert!(page.is_generated);
        assert!(!page.next_page_ready);
    }

    #[test]
    fn listing_defaults_when_fields_missing() {
        let listing: PageListing = serde_json::from_str("{}").unwrap();
        assert_eq!(listing, PageListing::default());
    }

    #[test]
    fn fallback_opening_differs_from_continuation() {
        let first = PageRecord::fallback(1);
        let later = PageRecord::fallback(7);

        assert_eq!(first.content, OPENING_PASSAGE);
        assert_eq!(later.content, CONTINUATION_PASSAGE);
        assert_eq!(later.page_number, 7);
        assert!(!first.next_page_ready && !later.next_page_ready);
    }

    proptest! {
        #[test]
        fn fallback_depends_only_on_page_number(n in 1u32..10_000) {
            let page = PageRecord::fallback(n);
            prop_assert_eq!(&page, &PageRecord::fallback(n));
            prop_assert_eq!(page.page_number, n);
            prop_assert_eq!(page.chapter_id, 1);
            prop_assert!(page.is_generated && !page.next_page_ready);
        }
    }
}

use serde_json::{Value as JsonValue, json};

/// Notion rejects rich text objects longer than this, counted in UTF-16 units.
pub const MAX_RICH_TEXT_UNITS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub content_id: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub text: Option<String>,
    pub color: Option<i64>,
}

impl Highlight {
    /// Text worth exporting, `None` for null or empty highlights.
    pub fn exportable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightColor {
    YellowBackground,
    PinkBackground,
    BlueBackground,
    GreenBackground,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::YellowBackground => "yellow_background",
            HighlightColor::PinkBackground => "pink_background",
            HighlightColor::BlueBackground => "blue_background",
            HighlightColor::GreenBackground => "green_background",
        }
    }

    /// Maps a Kobo bookmark color code. Unknown codes carry no annotation.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(HighlightColor::YellowBackground),
            1 => Some(HighlightColor::PinkBackground),
            2 => Some(HighlightColor::BlueBackground),
            3 => Some(HighlightColor::GreenBackground),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub author: String,
}

impl From<&Book> for NewPage {
    fn from(book: &Book) -> Self {
        NewPage {
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

/// A child block appended to a book page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    ListItem {
        text: String,
        color: Option<HighlightColor>,
    },
}

impl Block {
    pub fn highlight(highlight: &Highlight) -> Option<Self> {
        let text = highlight.exportable_text()?;
        Some(Block::ListItem {
            text: text.to_string(),
            color: highlight.color.and_then(HighlightColor::from_code),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Block::Heading(text) => json!({
                "object": "block",
                "type": "heading_2",
                "heading_2": { "rich_text": rich_text(text, None) },
            }),
            Block::ListItem { text, color } => json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": { "rich_text": rich_text(text, *color) },
            }),
        }
    }
}

fn rich_text(text: &str, color: Option<HighlightColor>) -> Vec<JsonValue> {
    split_utf16(text, MAX_RICH_TEXT_UNITS)
        .into_iter()
        .map(|content| {
            let mut item = json!({
                "type": "text",
                "text": { "content": content },
            });
            if let Some(color) = color {
                item["annotations"] = json!({ "color": color.as_str() });
            }
            item
        })
        .collect()
}

/// Splits on char boundaries into pieces of at most `limit` UTF-16 units.
fn split_utf16(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut units = 0;

    for (i, ch) in text.char_indices() {
        let width = ch.len_utf16();
        if units + width > limit {
            pieces.push(&text[start..i]);
            start = i;
            units = 0;
        }
        units += width;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_color_mapping_table() {
        assert_eq!(HighlightColor::from_code(0).map(|c| c.as_str()), Some("yellow_background"));
        assert_eq!(HighlightColor::from_code(1).map(|c| c.as_str()), Some("pink_background"));
        assert_eq!(HighlightColor::from_code(2).map(|c| c.as_str()), Some("blue_background"));
        assert_eq!(HighlightColor::from_code(3).map(|c| c.as_str()), Some("green_background"));
    }

    proptest! {
        #[test]
        fn test_unmapped_codes_have_no_color(code in any::<i64>().prop_filter("mapped", |c| !(0..=3).contains(c))) {
            prop_assert_eq!(HighlightColor::from_code(code), None);
        }
    }

    #[test]
    fn test_null_and_empty_highlights_produce_no_block() {
        let null = Highlight { text: None, color: Some(0) };
        let empty = Highlight { text: Some(String::new()), color: Some(0) };

        assert_eq!(Block::highlight(&null), None);
        assert_eq!(Block::highlight(&empty), None);
    }

    #[test]
    fn test_unknown_color_omits_annotation() {
        let h = Highlight { text: Some("quote".to_string()), color: Some(7) };
        let block = Block::highlight(&h).unwrap();

        assert_eq!(block, Block::ListItem { text: "quote".to_string(), color: None });

        let json = block.to_json();
        let item = &json["bulleted_list_item"]["rich_text"][0];
        assert_eq!(item["text"]["content"], "quote");
        assert!(item.get("annotations").is_none());
    }

    #[test]
    fn test_list_item_json_carries_color() {
        let h = Highlight { text: Some("fear is the mind-killer".to_string()), color: Some(1) };
        let json = Block::highlight(&h).unwrap().to_json();

        assert_eq!(json["type"], "bulleted_list_item");
        assert_eq!(
            json["bulleted_list_item"]["rich_text"][0]["annotations"]["color"],
            "pink_background"
        );
    }

    #[test]
    fn test_heading_json() {
        let json = Block::Heading("Highlights - 10/17/2026".to_string()).to_json();

        assert_eq!(json["type"], "heading_2");
        assert_eq!(json["heading_2"]["rich_text"][0]["text"]["content"], "Highlights - 10/17/2026");
    }

    #[test]
    fn test_long_highlight_is_split_into_segments() {
        let text = "é".repeat(MAX_RICH_TEXT_UNITS * 2 + 5);
        let h = Highlight { text: Some(text.clone()), color: Some(3) };
        let json = Block::highlight(&h).unwrap().to_json();

        let segments = json["bulleted_list_item"]["rich_text"].as_array().unwrap();
        assert_eq!(segments.len(), 3);

        let rebuilt: String = segments
            .iter()
            .map(|s| s["text"]["content"].as_str().unwrap())
            .collect();
        assert_eq!(rebuilt, text);
        assert!(segments.iter().all(|s| s["annotations"]["color"] == "green_background"));
    }

    #[test]
    fn test_astral_characters_count_as_two_units() {
        // 1500 emoji are 3000 UTF-16 units.
        let text = "😀".repeat(1500);
        let h = Highlight { text: Some(text.clone()), color: None };
        let json = Block::highlight(&h).unwrap().to_json();

        let segments: Vec<&str> = json["bulleted_list_item"]["rich_text"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["text"]["content"].as_str().unwrap())
            .collect();

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.encode_utf16().count() <= MAX_RICH_TEXT_UNITS));
        assert_eq!(segments[0].chars().count(), 1000);
        assert_eq!(segments.concat(), text);
    }

    #[test]
    fn test_split_utf16_keeps_exact_fit_whole() {
        let text = "a".repeat(MAX_RICH_TEXT_UNITS);

        assert_eq!(split_utf16(&text, MAX_RICH_TEXT_UNITS), vec![text.as_str()]);
        assert!(split_utf16("", MAX_RICH_TEXT_UNITS).is_empty());
    }
}

use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl Message {
    /// Plain-text system instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
        }
    }

    /// Plain-text user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Plain-text assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered text and image parts
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Extract text content, joining parts if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Image references in order of appearance
    pub fn images(&self) -> impl Iterator<Item = &str> {
        let parts = match self {
            Self::Text(_) => &[][..],
            Self::Parts(parts) => parts.as_slice(),
        };
        parts.iter().filter_map(|p| match p {
            ContentPart::Image { url, .. } => Some(url.as_str()),
            ContentPart::Text { .. } => None,
        })
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    Image {
        /// URL or base64 data URI for the image
        url: String,
        /// Detail level hint (e.g. "auto", "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Inline image payload parsed from a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage<'a> {
    /// MIME type, e.g. `image/png`
    pub media_type: &'a str,
    /// Base64 payload
    pub data: &'a str,
}

/// Split a `data:<mime>;base64,<payload>` URI into its parts
pub fn parse_data_uri(url: &str) -> Option<InlineImage<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (mime_and_encoding, data) = rest.split_once(',')?;
    let media_type = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
    Some(InlineImage { media_type, data })
}

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the function to call
    pub function: FunctionCall,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_join_text_and_skip_images() {
        let content = Content::Parts(vec![
            ContentPart::Text { text: "look at ".to_owned() },
            ContentPart::Image {
                url: "data:image/png;base64,AAAA".to_owned(),
                detail: None,
            },
            ContentPart::Text { text: "this".to_owned() },
        ]);

        assert_eq!(content.as_text(), "look at this");
        assert_eq!(content.images().collect::<Vec<_>>(), vec!["data:image/png;base64,AAAA"]);
    }

    #[test]
    fn data_uri_is_split() {
        let image = parse_data_uri("data:image/jpeg;base64,Zm9v").unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.data, "Zm9v");
    }

    #[test]
    fn remote_url_is_not_a_data_uri() {
        assert!(parse_data_uri("https://example.com/cat.png").is_none());
    }
}

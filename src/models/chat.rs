use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use serde::{ Serialize, Deserialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// An image attached to a message, already split out of its data URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Parses `data:<mime>;base64,<payload>`. Only image types are accepted.
    pub fn from_data_url(url: &str) -> Result<Self, String> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| "Image must be a data URL".to_string())?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| "Malformed data URL".to_string())?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| "Data URL must be base64 encoded".to_string())?;
        if !mime_type.starts_with("image/") {
            return Err(format!("Unsupported image type '{}'", mime_type));
        }
        STANDARD.decode(data).map_err(|e| format!("Invalid base64 image data: {}", e))?;
        Ok(Self { mime_type: mime_type.to_string(), data: data.to_string() })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub images: Vec<InlineImage>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), images: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), images: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), images: Vec::new() }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.images.push(image);
        self
    }
}

/// One entry of a chatter's conversation, as the client sends and stores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self { role: turn.role, content: turn.content.clone(), images: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_url() {
        let image = InlineImage::from_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBORw0KGgo=");
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn rejects_non_image_or_bad_payload() {
        assert!(InlineImage::from_data_url("https://example.com/a.png").is_err());
        assert!(InlineImage::from_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(InlineImage::from_data_url("data:image/png,raw").is_err());
        assert!(InlineImage::from_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"role": "assistant", "content": "hey"}"#).unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(ChatMessage::from(&turn), ChatMessage::assistant("hey"));
    }
}

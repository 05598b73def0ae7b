use lazy_static::lazy_static;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

lazy_static! {
    static ref SETTING_TOKEN: Regex = Regex::new(
        r#"SETTING:([A-Za-z_]+):(?:"([^"]*)"|(\S+))"#
    ).expect("setting token pattern is valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

/// One change to the chatter's working settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "camelCase")]
pub enum SettingCommand {
    Tone(String),
    FanName(String),
    ModelName(String),
    Prompt(String),
    Uncensored(bool),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub tone: Option<String>,
    pub fan_name: Option<String>,
    pub model_name: Option<String>,
    pub custom_prompt: Option<String>,
    pub is_uncensored: bool,
}

impl SessionSettings {
    pub fn apply(&mut self, command: &SettingCommand) {
        match command {
            SettingCommand::Tone(v) => {
                self.tone = Some(v.clone());
            }
            SettingCommand::FanName(v) => {
                self.fan_name = Some(v.clone());
            }
            SettingCommand::ModelName(v) => {
                self.model_name = Some(v.clone());
            }
            SettingCommand::Prompt(v) => {
                self.custom_prompt = Some(v.clone());
            }
            SettingCommand::Uncensored(v) => {
                self.is_uncensored = *v;
            }
        }
    }

    pub fn apply_all<'a>(&mut self, commands: impl IntoIterator<Item = &'a SettingCommand>) {
        for command in commands {
            self.apply(command);
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Builds a command from a setting name and raw value. Unknown names and
/// malformed values yield `None`.
pub fn command_from(name: &str, value: &str) -> Option<SettingCommand> {
    let key: String = name
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase();
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match key.as_str() {
        "tone" => Some(SettingCommand::Tone(value.to_string())),
        "fanname" => Some(SettingCommand::FanName(value.to_string())),
        "modelname" => Some(SettingCommand::ModelName(value.to_string())),
        "prompt" | "customprompt" => Some(SettingCommand::Prompt(value.to_string())),
        "uncensored" | "isuncensored" => parse_flag(value).map(SettingCommand::Uncensored),
        _ => None,
    }
}

pub fn contains_tokens(text: &str) -> bool {
    SETTING_TOKEN.is_match(text)
}

/// Scans for `SETTING:<NAME>:<value>` tokens. Returns the recognized commands
/// and the text with every token removed.
pub fn parse_tokens(text: &str) -> (Vec<SettingCommand>, String) {
    let mut commands = Vec::new();
    for caps in SETTING_TOKEN.captures_iter(text) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        if let Some(command) = command_from(name, value) {
            commands.push(command);
        }
    }
    let stripped = SETTING_TOKEN.replace_all(text, " ");
    let visible = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();
    (commands, visible)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a `[{"setting": ..., "value": ...}]` array. Bad entries are skipped.
pub fn parse_structured(value: &Value) -> Vec<SettingCommand> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("setting").and_then(Value::as_str)?;
                    let raw = item.get("value").and_then(value_as_string)?;
                    command_from(name, &raw)
                })
                .collect()
        })
        .unwrap_or_default()
}

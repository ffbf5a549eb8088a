use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ModelError, ReturnAddress};

/// Number of positional fields in the array form of a [`JobCommand`].
pub const JOB_COMMAND_ARITY: usize = 5;

/// The unit of work transported from a control process to a launcher and back.
///
/// The core never looks inside `data`; it only needs the job type (to pick a queue class),
/// the directories (to place command files) and the return address (to route the completion
/// message). Unknown top-level fields are kept in `extra` and written back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobCommand {
    /// Job type, e.g. `"INDEX"`, `"AUTO"` or `"ECHO"`.
    pub command: String,
    #[serde(default)]
    pub directories: Directories,
    /// Opaque payload for the external process.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher_settings: Option<Value>,
    /// Where the completion message goes. Never rewritten downstream.
    pub return_address: ReturnAddress,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Directory hints carried by a job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Directories {
    /// Working directory, usually relative to the launcher's launch directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobCommand {
    pub fn new(command: impl Into<String>, data: Value, return_address: ReturnAddress) -> Self {
        Self {
            command: command.into(),
            directories: Directories::default(),
            data,
            launcher_settings: None,
            return_address,
            extra: Map::new(),
        }
    }

    /// Unpack a decoded JSON value into a command.
    ///
    /// Accepts the object form (keyed by field name, with `type` accepted for `command`) and
    /// the positional form `[command, directories, data, launcher_settings, return_address]`.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Object(mut map) => {
                if !map.contains_key("command")
                    && let Some(kind) = map.remove("type")
                {
                    map.insert("command".to_string(), kind);
                }
                serde_json::from_value(Value::Object(map))
                    .map_err(|e| ModelError::Unpack(e.to_string()))
            }
            Value::Array(items) => {
                if items.len() != JOB_COMMAND_ARITY {
                    return Err(ModelError::Arity {
                        expected: JOB_COMMAND_ARITY,
                        found: items.len(),
                    });
                }
                let mut items = items.into_iter();
                let mut next = || items.next().unwrap_or(Value::Null);

                let command: String = field("command", next())?;
                let directories: Directories = match next() {
                    Value::Null => Directories::default(),
                    v => field("directories", v)?,
                };
                let data = next();
                let launcher_settings = match next() {
                    Value::Null => None,
                    v => Some(v),
                };
                let return_address: ReturnAddress = field("return_address", next())?;

                Ok(Self {
                    command,
                    directories,
                    data,
                    launcher_settings,
                    return_address,
                    extra: Map::new(),
                })
            }
            other => Err(ModelError::Unpack(format!(
                "expected an object or an array, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Parse JSON text and unpack it, see [`JobCommand::from_value`].
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Site tag the originator stamped on the job, if any.
    pub fn site_tag(&self) -> Option<&str> {
        self.extra.get("site_tag").and_then(Value::as_str)
    }

    /// Set `process.status`, creating the `process` object when missing.
    pub fn set_process_status(&mut self, status: i64) {
        let process = self
            .extra
            .entry("process")
            .or_insert_with(|| Value::Object(Map::new()));
        if !process.is_object() {
            *process = Value::Object(Map::new());
        }
        if let Value::Object(map) = process {
            map.insert("status".to_string(), Value::from(status));
        }
    }

    pub fn is_echo(&self) -> bool {
        self.command.eq_ignore_ascii_case(crate::ECHO_JOB)
    }
}

fn field<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, ModelError> {
    serde_json::from_value(value).map_err(|e| ModelError::Unpack(format!("{name}: {e}")))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Address;

    #[test]
    fn unpacks_object_with_type_key() {
        let cmd = JobCommand::from_value(json!({
            "type": "ECHO",
            "data": {"x": 1},
            "return_address": ["127.0.0.1", 50010]
        }))
        .unwrap();

        assert_eq!(cmd.command, "ECHO");
        assert_eq!(cmd.data, json!({"x": 1}));
        assert_eq!(cmd.return_address, Address::new("127.0.0.1", 50010));
        assert!(cmd.is_echo());
    }

    #[test]
    fn unpacks_positional_form() {
        let cmd = JobCommand::from_value(json!([
            "INDEX",
            {"work": "single/B_1", "launch_dir": "/tmp/launch"},
            {"image": "/raw/B_1_001.cbf"},
            null,
            ["10.0.0.1", 50000]
        ]))
        .unwrap();

        assert_eq!(cmd.command, "INDEX");
        assert_eq!(cmd.directories.work, Some(PathBuf::from("single/B_1")));
        assert!(cmd.launcher_settings.is_none());
        assert_eq!(cmd.return_address.port, 50000);
    }

    #[test]
    fn short_tuple_is_an_arity_error() {
        let err = JobCommand::from_value(json!(["INDEX", {}])).unwrap_err();
        assert!(matches!(err, ModelError::Arity { expected: 5, found: 2 }));
    }

    #[test]
    fn missing_return_address_is_an_unpack_error() {
        let err = JobCommand::from_value(json!({"command": "INDEX"})).unwrap_err();
        assert!(matches!(err, ModelError::Unpack(_)));
    }

    #[test]
    fn scalar_is_rejected() {
        let err = JobCommand::from_value(json!("INDEX")).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let original = json!({
            "command": "AUTO",
            "site_tag": "NECAT_E",
            "process": {"status": 0, "process_id": "abc"},
            "return_address": ["control", 50001]
        });
        let mut cmd = JobCommand::from_value(original).unwrap();
        assert_eq!(cmd.site_tag(), Some("NECAT_E"));

        cmd.set_process_status(100);
        let back = cmd.to_value().unwrap();
        assert_eq!(back["process"]["status"], json!(100));
        assert_eq!(back["process"]["process_id"], json!("abc"));
        assert_eq!(back["return_address"], json!(["control", 50001]));
    }

    #[test]
    fn process_status_replaces_non_object() {
        let mut cmd = JobCommand::new("ECHO", Value::Null, Address::new("h", 1));
        cmd.extra.insert("process".into(), json!("pending"));
        cmd.set_process_status(100);
        assert_eq!(cmd.extra["process"], json!({"status": 100}));
    }
}

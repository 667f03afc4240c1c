//! JSON response adapter: drives one metadata extraction end to end and
//! projects the response into a dotted-tag map.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::Receiver;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExifToolError;
use crate::events::ExifToolEvent;
use crate::process::ExifToolProcess;

const START_TIMEOUT_MS: u64 = 500;
const BINARY_PLACEHOLDER: &str = "binary data...";

/// One parsed tag: raw value, declared ExifTool type and description.
///
/// The dotted tag name (`group0.group1.group2.name`) is the map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub value: String,
    pub tag_type: String,
    pub description: String,
}

pub type TagMap = BTreeMap<String, TagInfo>;

/// Extracts a file's metadata through a supervised ExifTool process.
///
/// One [`ExifToolParser::load`] call submits
/// `-json -binary -G:0:1:2:4:6 -n -l <path>` and blocks until the
/// command completes (or the helper errors out), then exposes the
/// result through the `current_*` accessors.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use exiftool_process::ExifToolParser;
///
/// let mut parser = ExifToolParser::new();
/// parser.set_program("/usr/bin/exiftool", None);
/// parser.load(Path::new("image.jpg"))?;
///
/// for (name, tag) in parser.current_parsed_tags() {
///     println!("{name} = {}", tag.value);
/// }
/// # Ok::<(), exiftool_process::ExifToolError>(())
/// ```
pub struct ExifToolParser {
    process: ExifToolProcess,
    events: Receiver<ExifToolEvent>,
    translate: bool,
    parsed_path: String,
    parsed: TagMap,
    ignored: TagMap,
}

impl ExifToolParser {
    pub fn new() -> Self {
        let process = ExifToolProcess::new();
        let events = process.events();
        Self {
            process,
            events,
            translate: false,
            parsed_path: String::new(),
            parsed: TagMap::new(),
            ignored: TagMap::new(),
        }
    }

    /// Points the underlying supervisor at a specific helper binary.
    pub fn set_program(&self, helper: impl AsRef<Path>, interpreter: Option<&Path>) {
        self.process.set_program(helper, interpreter);
    }

    /// Turns re-keying of tags into another namespace on or off. Only
    /// raw passthrough is implemented; with translation enabled the
    /// per-tag projection is skipped.
    pub fn set_translations(&mut self, translate: bool) {
        self.translate = translate;
    }

    /// Reads metadata for `path` through the helper.
    ///
    /// Fails only when the file does not exist, the helper does not
    /// start within 500 ms, or the command is refused. Helper-side
    /// errors and unparseable output leave the tag maps empty and still
    /// count as success.
    pub fn load(&mut self, path: &Path) -> Result<(), ExifToolError> {
        // 1. Reset the previous snapshot.
        self.parsed_path.clear();
        self.parsed.clear();
        self.ignored.clear();

        if !path.is_file() {
            return Err(ExifToolError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        // 2. Drop events left over from an earlier load.
        for _ in self.events.try_iter() {}

        // 3. Bring the helper up (a no-op if it survived the last load).
        self.process.start();
        if !self.process.wait_started(START_TIMEOUT_MS) {
            self.process.kill();
            warn!(
                "ExifTool process cannot be started ({})",
                self.process.program().display()
            );
            return Err(ExifToolError::StartTimeout {
                program: self.process.program(),
                timeout_ms: START_TIMEOUT_MS,
            });
        }

        // 4. Request the metadata as one JSON document.
        let path_arg = path.to_string_lossy();
        let cmd_id = self.process.command(&[
            "-json",
            "-binary",
            "-G:0:1:2:4:6",
            "-n",
            "-l",
            path_arg.as_ref(),
        ]);
        if cmd_id == 0 {
            warn!("ExifTool parsing command cannot be sent");
            return Err(ExifToolError::CommandRejected {
                reason: "supervisor refused the extraction command".to_string(),
            });
        }

        // 5. Wait for completion, a helper error, or helper exit.
        loop {
            match self.events.recv() {
                Ok(ExifToolEvent::CommandCompleted { id, stdout, .. }) if id == cmd_id => {
                    self.ingest(&stdout);
                    return Ok(());
                }
                Ok(ExifToolEvent::ErrorOccurred(kind)) => {
                    warn!("ExifTool process reported an error during load: {kind:?}");
                    return Ok(());
                }
                Ok(ExifToolEvent::Finished {
                    exit_code,
                    exit_status,
                }) => {
                    debug!(
                        "ExifTool process finished with code {exit_code} and status {exit_status:?}"
                    );
                    return Ok(());
                }
                Ok(_) => {}
                Err(_) => return Err(ExifToolError::EventStreamClosed),
            }
        }
    }

    pub fn current_parsed_path(&self) -> &str {
        &self.parsed_path
    }

    pub fn current_parsed_tags(&self) -> &TagMap {
        &self.parsed
    }

    pub fn current_ignored_tags(&self) -> &TagMap {
        &self.ignored
    }

    pub fn current_error_string(&self) -> String {
        self.process.error_string()
    }

    /// Projects the helper's JSON document into the tag map. A document
    /// that does not parse leaves the maps empty.
    fn ingest(&mut self, stdout: &[u8]) {
        if let Err(e) = self.try_ingest(stdout) {
            warn!("ExifTool output is not valid JSON: {e}");
        }
    }

    /// Keys are colon-joined group/type/name tokens. Five tokens keep
    /// segment 3 as the type; four tokens carry no type; the bare
    /// `SourceFile` key names the parsed file; every other shape is
    /// dropped.
    fn try_ingest(&mut self, stdout: &[u8]) -> Result<(), ExifToolError> {
        let document: Value = serde_json::from_slice(stdout)?;

        let Some(object) = document
            .as_array()
            .and_then(|array| array.first())
            .and_then(Value::as_object)
        else {
            warn!("ExifTool output does not contain a metadata object");
            return Ok(());
        };

        for (key, value) in object {
            let sections: Vec<&str> = key.split(':').collect();
            let (name, tag_type) = match sections.as_slice() {
                [g0, g1, g2, ty, name] => (format!("{g0}.{g1}.{g2}.{name}"), (*ty).to_string()),
                [g0, g1, g2, name] => (format!("{g0}.{g1}.{g2}.{name}"), String::new()),
                ["SourceFile"] => {
                    self.parsed_path = scalar_string(value);
                    continue;
                }
                _ => continue,
            };

            if self.translate {
                // Re-keying into another tag namespace needs a mapping
                // table this crate does not ship.
                continue;
            }

            let props = value.as_object();
            let mut data = props
                .and_then(|p| p.get("val"))
                .map(scalar_string)
                .unwrap_or_default();
            let description = props
                .and_then(|p| p.get("desc"))
                .map(scalar_string)
                .unwrap_or_default();

            if data.starts_with("base64:") {
                data = BINARY_PLACEHOLDER.to_string();
            }

            self.parsed.insert(
                name,
                TagInfo {
                    value: data,
                    tag_type,
                    description,
                },
            );
        }

        Ok(())
    }
}

impl Default for ExifToolParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExifToolParser {
    fn drop(&mut self) {
        self.process.terminate();
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

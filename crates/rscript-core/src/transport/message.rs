//! Request payload carried in the first frame of a connection.

use serde::{Deserialize, Serialize};

use crate::script::ScriptFile;

use super::Endpoint;

/// A script submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Request {
    /// All files of the script folder.
    #[serde(alias = "Files")]
    pub files: Vec<ScriptFile>,
    /// Entry file name; the server default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Endpoint the server connects to for streaming `print` output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Request {
    pub fn new(files: Vec<ScriptFile>) -> Self {
        Self {
            files,
            entry: None,
            output: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_output(mut self, endpoint: &Endpoint) -> Self {
        self.output = Some(endpoint.as_str().to_string());
        self
    }

    /// Whether there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() || self.files.iter().all(ScriptFile::is_blank)
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a request frame.
    ///
    /// Besides the object form, a bare JSON array of files is accepted, which
    /// is what older bridges sent.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Object(Request),
            Files(Vec<ScriptFile>),
        }

        Ok(match serde_json::from_slice::<Wire>(bytes)? {
            Wire::Object(request) => request,
            Wire::Files(files) => Request::new(files),
        })
    }
}

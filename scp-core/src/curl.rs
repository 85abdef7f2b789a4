//! Config files for `curl -K`, one `url`/`output` block per file.

use itertools::Itertools;

const PREAMBLE: [&str; 2] = ["--create-dirs", "--compressed"];

/// Outcome of signing one file for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurlEntry {
    Signed { url: String, output: String },
    Failed { name: String },
}

impl CurlEntry {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Signed { url, output } => format!("url=\"{url}\"\noutput=\"{output}\""),
            Self::Failed { name } => format!(
                "# Error downloading {name}.  Did you delete the file in the bucket and not sync it in Single Cell Portal?"
            ),
        }
    }
}

#[must_use]
pub fn curl_config(entries: &[CurlEntry]) -> String {
    PREAMBLE
        .into_iter()
        .map(ToString::to_string)
        .chain(entries.iter().map(CurlEntry::render))
        .join("\n\n")
}

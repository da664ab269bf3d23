//! Archive naming convention.
//!
//! Remote archives and local data files share one file name layout:
//! `<SYMBOL>-<dataset>-<YYYY-MM-DD>.<ext>`. The catalog and the local
//! inventory both extract dates through [`ArchiveNaming::extract_date`], so
//! their date sets are directly comparable.

use chrono::NaiveDate;

use crate::config::RemoteConfig;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Builds remote keys and file names, and parses dates back out of them.
#[derive(Debug, Clone)]
pub struct ArchiveNaming {
    key_prefix: String,
    dataset: String,
    archive_extension: String,
}

impl ArchiveNaming {
    /// Create a naming scheme.
    pub fn new(
        key_prefix: impl Into<String>,
        dataset: impl Into<String>,
        archive_extension: impl Into<String>,
    ) -> Self {
        Self {
            key_prefix: key_prefix.into().trim_end_matches('/').to_string(),
            dataset: dataset.into(),
            archive_extension: archive_extension.into(),
        }
    }

    /// Create a naming scheme from the remote configuration.
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            config.key_prefix.as_str(),
            config.dataset.as_str(),
            config.archive_extension.as_str(),
        )
    }

    /// Extension of remote archives.
    pub fn archive_extension(&self) -> &str {
        &self.archive_extension
    }

    /// Listing prefix for one instrument/market, with a trailing slash.
    pub fn listing_prefix(&self, symbol: &str, market: &str) -> String {
        format!(
            "{}/{}/daily/{}/{}/",
            self.key_prefix, market, self.dataset, symbol
        )
    }

    /// File name for one date with the given extension.
    pub fn file_name(&self, symbol: &str, date: NaiveDate, ext: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            symbol,
            self.dataset,
            date.format(DATE_FORMAT),
            ext
        )
    }

    /// Full remote object key of one date's archive.
    pub fn archive_key(&self, symbol: &str, market: &str, date: NaiveDate) -> String {
        format!(
            "{}{}",
            self.listing_prefix(symbol, market),
            self.file_name(symbol, date, &self.archive_extension)
        )
    }

    /// Whether a key or file name carries the archive extension.
    pub fn is_archive(&self, name: &str) -> bool {
        has_extension(name, &self.archive_extension)
    }

    /// Extract the embedded date from a key or file name.
    ///
    /// Accepts full keys (anything before the last `/` is ignored). Returns
    /// `None` when the name does not follow the convention.
    pub fn extract_date(&self, name: &str) -> Option<NaiveDate> {
        let file = name.rsplit('/').next()?;
        let marker = format!("-{}-", self.dataset);
        let (_, tail) = file.rsplit_once(marker.as_str())?;
        let (date_part, ext) = tail.split_once('.')?;
        if ext.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
    }

    /// Extract the date of a local file, also checking it belongs to `symbol`.
    pub fn extract_symbol_date(&self, name: &str, symbol: &str) -> Option<NaiveDate> {
        let file = name.rsplit('/').next()?;
        let expected = format!("{}-{}-", symbol, self.dataset);
        if !file.starts_with(&expected) {
            return None;
        }
        self.extract_date(file)
    }
}

impl Default for ArchiveNaming {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

/// Case-sensitive extension check (`name` ends with `.ext`).
pub fn has_extension(name: &str, ext: &str) -> bool {
    name.len() > ext.len() + 1
        && name.ends_with(ext)
        && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
}

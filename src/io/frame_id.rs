use chrono::NaiveDate;
use regex::Regex;

use crate::types::{VegError, VegResult};

/// Extracts and checks the date prefix of frame ids
///
/// Granule ids such as `20190101T052221_20190101T052223_T43RGM` start with
/// the acquisition date. Ids shorter than the prefix, or whose prefix is not
/// all digits, are rejected instead of truncated.
#[derive(Debug, Clone)]
pub struct FrameIdParser {
    prefix_length: usize,
    pattern: Regex,
}

impl FrameIdParser {
    pub fn new(prefix_length: usize) -> VegResult<Self> {
        if prefix_length == 0 {
            return Err(VegError::InvalidConfig(
                "date_prefix_length must be at least 1".to_string(),
            ));
        }
        let pattern = Regex::new(&format!(r"^[0-9]{{{}}}", prefix_length))
            .map_err(|e| VegError::Processing(format!("Regex error: {}", e)))?;
        Ok(Self { prefix_length, pattern })
    }

    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    /// Date key (the digit prefix) of a frame or column id
    pub fn date_key<'a>(&self, frame_id: &'a str) -> VegResult<&'a str> {
        if frame_id.chars().count() < self.prefix_length {
            return Err(VegError::InvalidFrameId {
                frame_id: frame_id.to_string(),
                reason: format!(
                    "shorter than the {}-character date prefix",
                    self.prefix_length
                ),
            });
        }
        match self.pattern.find(frame_id) {
            Some(m) => Ok(m.as_str()),
            None => Err(VegError::InvalidFrameId {
                frame_id: frame_id.to_string(),
                reason: format!(
                    "first {} characters are not a date token",
                    self.prefix_length
                ),
            }),
        }
    }

    /// Calendar date of a frame id
    ///
    /// Only defined for the `YYYYMMDD` layout; other prefix lengths yield
    /// `Ok(None)` once the prefix itself has been validated.
    pub fn acquisition_date(&self, frame_id: &str) -> VegResult<Option<NaiveDate>> {
        let key = self.date_key(frame_id)?;
        if self.prefix_length != 8 {
            return Ok(None);
        }
        NaiveDate::parse_from_str(key, "%Y%m%d")
            .map(Some)
            .map_err(|e| VegError::InvalidFrameId {
                frame_id: frame_id.to_string(),
                reason: format!("'{}' is not a calendar date: {}", key, e),
            })
    }
}

use std::{path::PathBuf, str::FromStr};

use color_eyre::{eyre::eyre, Result};
use ethers_core::types::Address;
use serde::Deserialize;

/// Creators to seed the reward roster with, either inline or from a file with one address per
/// line. Anything after the address on a line is ignored, as are blank lines and `#` comments
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RosterConfig {
    #[serde(default, rename = "creators_file")]
    file: Option<PathBuf>,
    #[serde(default)]
    creators: Option<Vec<Address>>,
}

impl RosterConfig {
    pub fn creators(&self) -> &[Address] {
        self.creators.as_deref().unwrap_or_default()
    }

    pub(super) fn preload(&mut self) -> Result<()> {
        if self.creators.is_some() {
            return Ok(());
        }

        if let Some(file) = &self.file {
            let contents = std::fs::read_to_string(file)?;
            let creators = contents
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .filter(|token| !token.starts_with('#'))
                .map(|token| {
                    Address::from_str(token).map_err(|e| eyre!("invalid creator {}: {}", token, e))
                })
                .collect::<Result<Vec<_>>>()?;

            self.creators = Some(creators);
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn for_test(creators: Vec<Address>) -> Self {
        Self {
            file: None,
            creators: Some(creators),
        }
    }
}

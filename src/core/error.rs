//! Error types for the grass renderer

use std::fmt;

use thiserror::Error;

/// A single problem found while initializing the simulation.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigIssue {
    MissingTerrain,
    MissingHeightmap,
    MissingCamera,
    MissingVisibilityKernel,
    MissingMaterial,
    /// Terrain is smaller than one patch along some axis
    EmptyPatchGrid { columns: u32, rows: u32 },
    InvalidSetting { name: &'static str, reason: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTerrain => write!(f, "terrain sampler not set"),
            Self::MissingHeightmap => write!(f, "heightmap not set"),
            Self::MissingCamera => write!(f, "camera not set"),
            Self::MissingVisibilityKernel => write!(f, "visibility kernel not set"),
            Self::MissingMaterial => write!(f, "grass material not set"),
            Self::EmptyPatchGrid { columns, rows } => {
                write!(f, "patch grid is empty ({columns}x{rows})")
            }
            Self::InvalidSetting { name, reason } => write!(f, "setting `{name}`: {reason}"),
        }
    }
}

/// Every configuration problem found in one initialization pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigIssues(pub Vec<ConfigIssue>);

impl ConfigIssues {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.0.iter()
    }

    pub fn contains(&self, issue: &ConfigIssue) -> bool {
        self.0.contains(issue)
    }
}

impl fmt::Display for ConfigIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Main error type for the grass renderer
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(ConfigIssues),

    #[error("grass simulation is not ready")]
    NotReady,

    #[error("grass simulation has been destroyed")]
    Destroyed,

    #[error("GPU allocation of `{label}` failed: {requested} bytes requested, limit {limit}")]
    ResourceExhausted {
        label: String,
        requested: u64,
        limit: u64,
    },

    #[error("GPU error: {0}")]
    Gpu(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issues_display_lists_all() {
        let issues = ConfigIssues(vec![
            ConfigIssue::MissingTerrain,
            ConfigIssue::MissingCamera,
            ConfigIssue::InvalidSetting {
                name: "patch_size",
                reason: "must be positive".into(),
            },
        ]);
        let text = Error::Configuration(issues).to_string();
        assert!(text.contains("terrain sampler not set"));
        assert!(text.contains("camera not set"));
        assert!(text.contains("`patch_size`: must be positive"));
    }

    #[test]
    fn test_resource_exhausted_message() {
        let err = Error::ResourceExhausted {
            label: "grass_data_a".into(),
            requested: 1024,
            limit: 512,
        };
        assert!(err.to_string().contains("grass_data_a"));
    }
}

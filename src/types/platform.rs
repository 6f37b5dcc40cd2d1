use serde::{Deserialize, Serialize};

/// Meeting platforms the pipeline ingests webhooks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Zoom,
    MicrosoftTeams,
    GoogleMeet,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Zoom => "zoom",
            Platform::MicrosoftTeams => "microsoft_teams",
            Platform::GoogleMeet => "google_meet",
        }
    }

    /// Accepts both the storage name and the URL path segment
    /// (`/webhooks/teams`, `/webhooks/meet`).
    pub fn parse(value: &str) -> Option<Platform> {
        match value {
            "zoom" => Some(Platform::Zoom),
            "microsoft_teams" | "teams" => Some(Platform::MicrosoftTeams),
            "google_meet" | "meet" => Some(Platform::GoogleMeet),
            _ => None,
        }
    }

    pub fn all() -> [Platform; 3] {
        [
            Platform::Zoom,
            Platform::MicrosoftTeams,
            Platform::GoogleMeet,
        ]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Player profiles and room membership

use uuid::Uuid;

use crate::ws::protocol::{PlayerData, PlayerInfo, Seat};

pub const DEFAULT_USERNAME: &str = "Guest";
pub const DEFAULT_RATING: u32 = 1000;
pub const MAX_RATING: u32 = 4000;
pub const MAX_USERNAME_CHARS: usize = 20;

/// Sanitized player data. Rating is still client-reported; it only bounds
/// matchmaking and is never written back anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    pub username: String,
    pub rating: u32,
    pub character: serde_json::Value,
}

impl PlayerProfile {
    pub fn new(username: impl Into<String>, rating: u32) -> Self {
        Self {
            username: username.into(),
            rating,
            character: serde_json::Value::Null,
        }
    }

    /// Build a profile from client data, filling defaults and clamping ranges
    pub fn from_data(data: PlayerData) -> Self {
        let username = data
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.chars().take(MAX_USERNAME_CHARS).collect())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        let rating = data
            .rating
            // Zero means "unrated"
            .filter(|r| r.is_finite() && *r != 0.0)
            .map(|r| r.round().clamp(0.0, MAX_RATING as f64) as u32)
            .unwrap_or(DEFAULT_RATING);

        Self {
            username,
            rating,
            character: data.character.unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            username: self.username.clone(),
            rating: self.rating,
            character: self.character.clone(),
        }
    }
}

/// A connection seated in a room
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub connection_id: Uuid,
    pub seat: Seat,
    pub profile: PlayerProfile,
    pub score: u32,
    pub ready: bool,
}

impl RoomMember {
    pub fn new(connection_id: Uuid, seat: Seat, profile: PlayerProfile) -> Self {
        Self {
            connection_id,
            seat,
            profile,
            score: 0,
            ready: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_data_gets_defaults() {
        let profile = PlayerProfile::from_data(PlayerData::default());
        assert_eq!(profile.username, "Guest");
        assert_eq!(profile.rating, 1000);
        assert!(profile.character.is_null());
    }

    #[test]
    fn username_is_trimmed_and_capped() {
        let profile = PlayerProfile::from_data(PlayerData {
            username: Some("   The Man With No Name Whatsoever  ".into()),
            ..PlayerData::default()
        });
        assert_eq!(profile.username.chars().count(), MAX_USERNAME_CHARS);
        assert!(profile.username.starts_with("The Man"));

        let blank = PlayerProfile::from_data(PlayerData {
            username: Some("   ".into()),
            ..PlayerData::default()
        });
        assert_eq!(blank.username, "Guest");
    }

    #[test]
    fn rating_is_clamped() {
        let high = PlayerProfile::from_data(PlayerData {
            rating: Some(99_999.0),
            ..PlayerData::default()
        });
        assert_eq!(high.rating, MAX_RATING);

        let negative = PlayerProfile::from_data(PlayerData {
            rating: Some(-40.0),
            ..PlayerData::default()
        });
        assert_eq!(negative.rating, 0);

        let nan = PlayerProfile::from_data(PlayerData {
            rating: Some(f64::NAN),
            ..PlayerData::default()
        });
        assert_eq!(nan.rating, DEFAULT_RATING);
    }

    #[test]
    fn zero_rating_gets_default() {
        let profile = PlayerProfile::from_data(PlayerData {
            rating: Some(0.0),
            ..PlayerData::default()
        });
        assert_eq!(profile.rating, DEFAULT_RATING);
    }

    #[test]
    fn character_is_forwarded_verbatim() {
        let character = json!({"hat": "stetson", "colors": [1, 2, 3]});
        let profile = PlayerProfile::from_data(PlayerData {
            character: Some(character.clone()),
            ..PlayerData::default()
        });
        assert_eq!(profile.info().character, character);
    }
}

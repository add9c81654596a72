// Post payload types, deserialized once at startup.
// The shape mirrors the platform API: a post carries an ordered string of
// audio beads and, optionally, a poll block with pre-aggregated totals.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub beads: Vec<Bead>,
    #[serde(default)]
    pub poll: Option<Poll>,
}

/// One turn in the post's audio string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bead {
    pub user: String,
    /// Path to the bead's audio source. Remote beads are expected to be
    /// mirrored locally before the client runs; a missing or unreadable
    /// source leaves the bead permanently unplayable, never crashes.
    pub bead_url: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    #[serde(rename = "type")]
    pub kind: PollKind,
    pub answers: Vec<PollAnswer>,
    pub total_votes: f64,
    pub total_points: f64,
    pub total_users: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PollKind {
    #[serde(rename = "single-choice")]
    SingleChoice,
    #[serde(rename = "multiple-choice")]
    MultipleChoice,
    /// Votes carry point weights; the chart weighs by points instead of
    /// ballot count.
    #[serde(rename = "weighted-choice")]
    WeightedChoice,
}

impl Poll {
    pub fn weighted(&self) -> bool {
        self.kind == PollKind::WeightedChoice
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollAnswer {
    pub text: String,
    #[serde(default)]
    pub total_votes: f64,
    #[serde(default)]
    pub total_points: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_shaped_payload() {
        let json = r#"{
            "id": 42,
            "title": "glass bead game",
            "beads": [
                { "user": "ada", "beadUrl": "audio/turn-1.mp3" },
                { "user": "lin", "beadUrl": "audio/turn-2.mp3" }
            ],
            "poll": {
                "type": "weighted-choice",
                "answers": [
                    { "text": "yes", "totalVotes": 3, "totalPoints": 220 },
                    { "text": "no", "totalVotes": 1, "totalPoints": 80 }
                ],
                "totalVotes": 4,
                "totalPoints": 300,
                "totalUsers": 4
            }
        }"#;

        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.beads.len(), 2);
        assert_eq!(post.beads[1].user, "lin");
        let poll = post.poll.unwrap();
        assert!(poll.weighted());
        assert_eq!(poll.answers[0].total_points, 220.0);
    }

    #[test]
    fn poll_is_optional_and_beads_default_empty() {
        let post: Post = serde_json::from_str(r#"{ "id": 1, "title": "t" }"#).unwrap();
        assert!(post.beads.is_empty());
        assert!(post.poll.is_none());
    }
}

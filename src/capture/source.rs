use std::collections::BTreeMap;
use std::process::{Child, ChildStdout, Command, Stdio};

use super::CaptureError;

/// Configured input that asks for the active player's stream.
pub const AUTO_SOURCE: &str = "auto";

/// Known player identities and the capture targets their streams are named by.
const KNOWN_PLAYERS: &[(&[&str], &str)] = &[
    (&["firefox", "mozilla firefox"], "Firefox"),
    (&["vlc", "vlc media player"], "VLC media player (LibVLC 3.0.21)"),
];

/// The one value the capture loop needs from the media-player side.
pub trait NowPlaying: Send {
    /// Display name of the player currently producing audio, if any.
    fn player_identity(&self) -> Option<String>;
}

/// Asks `playerctl` for the active player.
pub struct Playerctl;

impl NowPlaying for Playerctl {
    fn player_identity(&self) -> Option<String> {
        let output = Command::new("playerctl")
            .args(["metadata", "--format", "{{playerName}}"])
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!name.is_empty()).then_some(name)
    }
}

/// How the configured input maps onto a capture target.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSpec {
    pub input: String,
    pub fallback: String,
    /// Extra identity -> target entries, matched before the built-in table.
    pub players: BTreeMap<String, String>,
}

impl SourceSpec {
    /// Look up a player identity, ignoring case and surrounding whitespace.
    pub fn target_for_player(&self, identity: &str) -> Option<String> {
        let needle = identity.trim().to_lowercase();
        if let Some((_, target)) = self
            .players
            .iter()
            .find(|(name, _)| name.trim().to_lowercase() == needle)
        {
            return Some(target.clone());
        }
        KNOWN_PLAYERS
            .iter()
            .find(|(names, _)| names.contains(&needle.as_str()))
            .map(|(_, target)| target.to_string())
    }

    /// Resolve the capture target. Anything other than `auto` is used verbatim.
    pub fn resolve(&self, now_playing: &dyn NowPlaying) -> String {
        if !self.input.eq_ignore_ascii_case(AUTO_SOURCE) {
            return self.input.clone();
        }
        match now_playing.player_identity() {
            Some(identity) => match self.target_for_player(&identity) {
                Some(target) => {
                    log::info!("Detected player '{}', capturing from '{}'", identity, target);
                    target
                }
                None => {
                    log::warn!(
                        "No capture target known for player '{}', falling back to '{}'",
                        identity, self.fallback
                    );
                    self.fallback.clone()
                }
            },
            None => {
                log::warn!("No active player detected, falling back to '{}'", self.fallback);
                self.fallback.clone()
            }
        }
    }
}

/// A running capture subprocess streaming raw f32 PCM on stdout.
pub struct SourceProcess {
    child: Child,
}

impl SourceProcess {
    pub fn spawn(
        command: &str,
        target: &str,
        sample_rate: u32,
        channels: u32,
    ) -> Result<Self, CaptureError> {
        let args = capture_args(target, sample_rate, channels);
        let child = Command::new(command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| CaptureError::SourceUnavailable {
                command: command.to_string(),
                source,
            })?;

        log::info!(
            "Capture source started: {} --target '{}' ({} Hz, {} ch, f32)",
            command, target, sample_rate, channels
        );
        Ok(Self { child })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for the process to exit once its stdout has been dropped; a writer
    /// with no reader gets SIGPIPE. `true` when it exited successfully.
    pub fn finish(mut self) -> bool {
        match self.child.wait() {
            Ok(status) => status.success(),
            Err(err) => {
                log::warn!("Failed to reap capture process: {}", err);
                false
            }
        }
    }

    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn capture_args(target: &str, sample_rate: u32, channels: u32) -> Vec<String> {
    vec![
        "--record".into(),
        "--raw".into(),
        "--target".into(), target.to_string(),
        "--format".into(), "f32".into(),
        "--rate".into(), sample_rate.to_string(),
        "--channels".into(), channels.to_string(),
        "-".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPlayer(Option<&'static str>);

    impl NowPlaying for FixedPlayer {
        fn player_identity(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn spec(input: &str) -> SourceSpec {
        SourceSpec {
            input: input.to_string(),
            fallback: "auto".to_string(),
            players: BTreeMap::new(),
        }
    }

    #[test]
    fn explicit_source_is_used_verbatim() {
        let resolved = spec("alsa_output.monitor").resolve(&FixedPlayer(Some("Firefox")));
        assert_eq!(resolved, "alsa_output.monitor");
    }

    #[test]
    fn known_players_map_to_their_targets() {
        let auto = spec("Auto");
        assert_eq!(auto.resolve(&FixedPlayer(Some("Mozilla Firefox"))), "Firefox");
        assert_eq!(auto.resolve(&FixedPlayer(Some("firefox"))), "Firefox");
        assert_eq!(
            auto.resolve(&FixedPlayer(Some("VLC media player"))),
            "VLC media player (LibVLC 3.0.21)"
        );
    }

    #[test]
    fn unknown_player_falls_back() {
        let mut auto = spec("auto");
        auto.fallback = "@DEFAULT_MONITOR@".to_string();
        assert_eq!(auto.resolve(&FixedPlayer(Some("Rhythmbox"))), "@DEFAULT_MONITOR@");
        assert_eq!(auto.resolve(&FixedPlayer(None)), "@DEFAULT_MONITOR@");
    }

    #[test]
    fn configured_players_take_precedence() {
        let mut auto = spec("auto");
        auto.players.insert("Spotify".into(), "spotify".into());
        auto.players.insert("firefox".into(), "firefox-nightly".into());
        assert_eq!(auto.resolve(&FixedPlayer(Some("spotify"))), "spotify");
        assert_eq!(auto.resolve(&FixedPlayer(Some("Firefox"))), "firefox-nightly");
    }

    #[test]
    fn capture_args_request_raw_f32() {
        let args = capture_args("Firefox", 44100, 2);
        assert_eq!(args.last().map(String::as_str), Some("-"));
        let format = args.iter().position(|a| a == "--format").unwrap();
        assert_eq!(args[format + 1], "f32");
        let target = args.iter().position(|a| a == "--target").unwrap();
        assert_eq!(args[target + 1], "Firefox");
    }

    #[test]
    fn missing_command_is_source_unavailable() {
        let result = SourceProcess::spawn("/nonexistent/pw-cat", "auto", 44100, 2);
        assert!(matches!(result, Err(CaptureError::SourceUnavailable { .. })));
    }
}

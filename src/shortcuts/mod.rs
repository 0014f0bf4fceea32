//! # Keyboard & Command Surface
//!
//! Maps the fixed shortcut intents and the options-menu entries onto session
//! events and widget actions. The only dispatch rule enforced here is that a
//! manual send needs a non-empty URL.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::Event;
use crate::http::request::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    FocusUrl,
    SendOrConnect,
    ToggleMethodMenu,
    ToggleOptionsMenu,
}

/// Actions on editor widgets owned by the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetAction {
    FocusUrl,
    ToggleMethodMenu,
    ToggleOptionsMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondsPrompt {
    Delay,
    Interval,
}

impl SecondsPrompt {
    pub fn title(self) -> &'static str {
        match self {
            SecondsPrompt::Delay => "Send After Delay",
            SecondsPrompt::Interval => "Repeat on Interval",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceAction {
    Widget(WidgetAction),
    Session(Event),
    PromptSeconds(SecondsPrompt),
    ShowCodeExport,
    ChooseDownloadDirectory,
    ClearDownloadPath,
    None,
}

pub fn handle_intent(intent: Intent, url: &str) -> SurfaceAction {
    match intent {
        Intent::FocusUrl => SurfaceAction::Widget(WidgetAction::FocusUrl),
        Intent::SendOrConnect => {
            if url.trim().is_empty() {
                return SurfaceAction::None;
            }
            SurfaceAction::Session(Event::ManualDispatch {
                prompt_for_post_download: false,
            })
        }
        Intent::ToggleMethodMenu => SurfaceAction::Widget(WidgetAction::ToggleMethodMenu),
        Intent::ToggleOptionsMenu => SurfaceAction::Widget(WidgetAction::ToggleOptionsMenu),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    SendNow,
    ShowCodeExport,
    SendAfterDelay,
    RepeatOnInterval,
    DownloadAfterSend,
    StopAutoDownload,
    SendAndDownload,
}

impl MenuItem {
    pub fn label(self) -> &'static str {
        match self {
            MenuItem::SendNow => "Send Now",
            MenuItem::ShowCodeExport => "Show Code Export",
            MenuItem::SendAfterDelay => "Send After Delay",
            MenuItem::RepeatOnInterval => "Repeat on Interval",
            MenuItem::DownloadAfterSend => "Download After Send",
            MenuItem::StopAutoDownload => "Stop Auto-Download",
            MenuItem::SendAndDownload => "Send And Download",
        }
    }
}

/// Options-menu entries. Exactly one of the two download toggles is shown.
pub fn menu_items(auto_download: bool) -> Vec<MenuItem> {
    let download_toggle = if auto_download {
        MenuItem::StopAutoDownload
    } else {
        MenuItem::DownloadAfterSend
    };
    vec![
        MenuItem::SendNow,
        MenuItem::ShowCodeExport,
        MenuItem::SendAfterDelay,
        MenuItem::RepeatOnInterval,
        download_toggle,
        MenuItem::SendAndDownload,
    ]
}

pub fn handle_menu_item(item: MenuItem) -> SurfaceAction {
    match item {
        MenuItem::SendNow => SurfaceAction::Session(Event::ManualDispatch {
            prompt_for_post_download: false,
        }),
        MenuItem::ShowCodeExport => SurfaceAction::ShowCodeExport,
        MenuItem::SendAfterDelay => SurfaceAction::PromptSeconds(SecondsPrompt::Delay),
        MenuItem::RepeatOnInterval => SurfaceAction::PromptSeconds(SecondsPrompt::Interval),
        MenuItem::DownloadAfterSend => SurfaceAction::ChooseDownloadDirectory,
        MenuItem::StopAutoDownload => SurfaceAction::ClearDownloadPath,
        MenuItem::SendAndDownload => SurfaceAction::Session(Event::ManualDispatch {
            prompt_for_post_download: true,
        }),
    }
}

/// Parse a seconds prompt answer. Fractions are allowed; anything that is
/// not a positive finite number is rejected.
pub fn parse_seconds(input: &str) -> Option<Duration> {
    let seconds: f64 = input.trim().parse().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// The session event for a prompt answer, or `None` if the prompt was dismissed
/// or the answer was not a number of seconds.
pub fn seconds_entered(prompt: SecondsPrompt, input: &str) -> Option<Event> {
    let period = parse_seconds(input)?;
    Some(match prompt {
        SecondsPrompt::Delay => Event::DelayRequested(period),
        SecondsPrompt::Interval => Event::IntervalRequested(period),
    })
}

pub fn button_label(kind: RequestKind, cancellable: bool) -> &'static str {
    match (kind, cancellable) {
        (RequestKind::EventStream, false) => "Connect",
        (RequestKind::EventStream, true) => "Disconnect",
        (RequestKind::OneShot, false) => "Send",
        (RequestKind::OneShot, true) => "Cancel",
    }
}

/// Key chords bound to each intent. `mod` is the platform command key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyMap {
    pub focus_url: String,
    pub send: String,
    pub toggle_method_menu: String,
    pub toggle_options_menu: String,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            focus_url: "mod+l".into(),
            send: "mod+enter".into(),
            toggle_method_menu: "mod+alt+l".into(),
            toggle_options_menu: "mod+shift+o".into(),
        }
    }
}

impl KeyMap {
    pub fn intent_for(&self, chord: &str) -> Option<Intent> {
        let chord = normalize_chord(chord);
        [
            (&self.focus_url, Intent::FocusUrl),
            (&self.send, Intent::SendOrConnect),
            (&self.toggle_method_menu, Intent::ToggleMethodMenu),
            (&self.toggle_options_menu, Intent::ToggleOptionsMenu),
        ]
        .into_iter()
        .find(|(bound, _)| normalize_chord(bound) == chord)
        .map(|(_, intent)| intent)
    }
}

/// Lowercase, with `ctrl`/`cmd`/`meta` folded into `mod` and modifiers sorted.
fn normalize_chord(chord: &str) -> String {
    let mut modifiers = Vec::new();
    let mut key = None;
    for part in chord.split('+').map(|part| part.trim().to_ascii_lowercase()) {
        match part.as_str() {
            "" => {}
            "mod" | "ctrl" | "control" | "cmd" | "command" | "meta" => {
                modifiers.push("mod".to_string())
            }
            "alt" | "option" | "shift" => modifiers.push(part),
            _ => key = Some(part),
        }
    }
    modifiers.sort();
    modifiers.dedup();
    modifiers.extend(key);
    modifiers.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_requires_a_url() {
        assert_eq!(handle_intent(Intent::SendOrConnect, "   "), SurfaceAction::None);
        assert_eq!(
            handle_intent(Intent::SendOrConnect, "https://example.com"),
            SurfaceAction::Session(Event::ManualDispatch {
                prompt_for_post_download: false
            })
        );
    }

    #[test]
    fn widget_intents_ignore_url() {
        assert_eq!(
            handle_intent(Intent::ToggleOptionsMenu, ""),
            SurfaceAction::Widget(WidgetAction::ToggleOptionsMenu)
        );
        assert_eq!(
            handle_intent(Intent::FocusUrl, ""),
            SurfaceAction::Widget(WidgetAction::FocusUrl)
        );
    }

    #[test]
    fn menu_shows_one_download_toggle() {
        let off = menu_items(false);
        assert!(off.contains(&MenuItem::DownloadAfterSend));
        assert!(!off.contains(&MenuItem::StopAutoDownload));

        let on = menu_items(true);
        assert!(on.contains(&MenuItem::StopAutoDownload));
        assert!(!on.contains(&MenuItem::DownloadAfterSend));
    }

    #[test]
    fn menu_labels_match_command_names() {
        let labels: Vec<&str> = menu_items(false).iter().map(|item| item.label()).collect();
        assert!(labels.contains(&"Send Now"));
        assert!(labels.contains(&"Show Code Export"));
        assert!(labels.contains(&"Send And Download"));
    }

    #[test]
    fn send_and_download_prompts_for_path() {
        assert_eq!(
            handle_menu_item(MenuItem::SendAndDownload),
            SurfaceAction::Session(Event::ManualDispatch {
                prompt_for_post_download: true
            })
        );
        assert_eq!(
            handle_menu_item(MenuItem::RepeatOnInterval),
            SurfaceAction::PromptSeconds(SecondsPrompt::Interval)
        );
    }

    #[test]
    fn seconds_must_be_positive_numbers() {
        assert_eq!(parse_seconds(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_seconds("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_seconds("0"), None);
        assert_eq!(parse_seconds("-3"), None);
        assert_eq!(parse_seconds("soon"), None);
        assert_eq!(parse_seconds("inf"), None);
    }

    #[test]
    fn seconds_answer_becomes_session_event() {
        assert_eq!(
            seconds_entered(SecondsPrompt::Delay, "3"),
            Some(Event::DelayRequested(Duration::from_secs(3)))
        );
        assert_eq!(seconds_entered(SecondsPrompt::Interval, ""), None);
    }

    #[test]
    fn labels_follow_kind_and_cancellability() {
        assert_eq!(button_label(RequestKind::OneShot, false), "Send");
        assert_eq!(button_label(RequestKind::OneShot, true), "Cancel");
        assert_eq!(button_label(RequestKind::EventStream, false), "Connect");
        assert_eq!(button_label(RequestKind::EventStream, true), "Disconnect");
    }

    #[test]
    fn chords_match_regardless_of_spelling() {
        let keys = KeyMap::default();
        assert_eq!(keys.intent_for("Ctrl+Enter"), Some(Intent::SendOrConnect));
        assert_eq!(keys.intent_for("alt + cmd + L"), Some(Intent::ToggleMethodMenu));
        assert_eq!(keys.intent_for("mod+l"), Some(Intent::FocusUrl));
        assert_eq!(keys.intent_for("shift+mod+o"), Some(Intent::ToggleOptionsMenu));
        assert_eq!(keys.intent_for("mod+k"), None);
    }
}

//! Symbolic action names mapped to platform key codes.
//!
//! Viewers send button presses by name (`"home"`, `"back"`, ...).  Android
//! links translate the name to an `input keyevent` code; iOS links only know
//! the hardware home button.  Unknown names resolve to `None` and the caller
//! drops the request silently.

use serde::{Deserialize, Serialize};

/// Android keys reachable from the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AndroidKey {
    Home,
    Back,
    Menu,
    Power,
    VolumeUp,
    VolumeDown,
    AppSwitch,
    Enter,
}

impl AndroidKey {
    /// Every key in the lookup table.
    pub const ALL: [AndroidKey; 8] = [
        AndroidKey::Home,
        AndroidKey::Back,
        AndroidKey::Menu,
        AndroidKey::Power,
        AndroidKey::VolumeUp,
        AndroidKey::VolumeDown,
        AndroidKey::AppSwitch,
        AndroidKey::Enter,
    ];

    /// Resolves an action name, ignoring ASCII case.
    pub fn from_action(action: &str) -> Option<Self> {
        let action = action.trim();
        Self::ALL
            .into_iter()
            .find(|key| key.action_name().eq_ignore_ascii_case(action))
    }

    /// The name viewers use for this key.
    pub fn action_name(self) -> &'static str {
        match self {
            AndroidKey::Home => "home",
            AndroidKey::Back => "back",
            AndroidKey::Menu => "menu",
            AndroidKey::Power => "power",
            AndroidKey::VolumeUp => "volume_up",
            AndroidKey::VolumeDown => "volume_down",
            AndroidKey::AppSwitch => "app_switch",
            AndroidKey::Enter => "enter",
        }
    }

    /// `KeyEvent.KEYCODE_*` value passed to `input keyevent`.
    pub fn key_code(self) -> u32 {
        match self {
            AndroidKey::Home => 3,
            AndroidKey::Back => 4,
            AndroidKey::Menu => 82,
            AndroidKey::Power => 26,
            AndroidKey::VolumeUp => 24,
            AndroidKey::VolumeDown => 25,
            AndroidKey::AppSwitch => 187,
            AndroidKey::Enter => 66,
        }
    }
}

/// iOS hardware buttons reachable from the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IosButton {
    Home,
}

impl IosButton {
    /// Resolves an action name, ignoring ASCII case.
    pub fn from_action(action: &str) -> Option<Self> {
        if action.trim().eq_ignore_ascii_case("home") {
            Some(IosButton::Home)
        } else {
            None
        }
    }

    /// Button name understood by the automation agent's `pressButton` call.
    pub fn agent_name(self) -> &'static str {
        match self {
            IosButton::Home => "home",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

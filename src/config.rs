//! パッド設定
//!
//! 設定ストアのセクション:
//! - `Pad{n}`: JoystickUID, ReverseLX/LY/RX/RY, MouseL/R, Button{番号}
//! - `Pad`: MouseSensibility, FFIntensity

use serde::{Deserialize, Serialize};

use crate::bindings::{BindingTable, DEFAULT_BINDING_PADS, DEFAULT_KEYBOARD_BINDINGS};
use crate::button::{Axis, VirtualButton};
use crate::key_status::MAX_PADS;
use crate::settings::SettingsInterface;

/// マウス感度の既定値
pub const DEFAULT_SENSIBILITY: u32 = 100;

/// 振動強度の既定値（最大）
pub const DEFAULT_FF_INTENSITY: u32 = 0x7FFF;

/// パッドごとのオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadOptions {
    pub forcefeedback: bool,
    pub reverse_lx: bool,
    pub reverse_ly: bool,
    pub reverse_rx: bool,
    pub reverse_ry: bool,
    pub mouse_l: bool,
    pub mouse_r: bool,
}

impl PadOptions {
    /// 軸の反転設定
    pub fn is_reversed(&self, axis: Axis) -> bool {
        match axis {
            Axis::LeftX => self.reverse_lx,
            Axis::LeftY => self.reverse_ly,
            Axis::RightX => self.reverse_rx,
            Axis::RightY => self.reverse_ry,
        }
    }
}

/// パッド設定全体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadConfig {
    pub pad_options: [PadOptions; MAX_PADS],
    joy_uid: [u32; MAX_PADS],
    sensibility: u32,
    ff_intensity: u32,
}

impl Default for PadConfig {
    fn default() -> Self {
        PadConfig {
            pad_options: [PadOptions::default(); MAX_PADS],
            joy_uid: [0; MAX_PADS],
            sensibility: DEFAULT_SENSIBILITY,
            ff_intensity: DEFAULT_FF_INTENSITY,
        }
    }
}

fn pad_section(pad: usize) -> String {
    format!("Pad{}", pad)
}

fn button_key(button: VirtualButton) -> String {
    format!("Button{}", button.index())
}

impl PadConfig {
    pub fn init(&mut self) {
        *self = PadConfig::default();
    }

    pub fn joy_uid(&self, pad: usize) -> u32 {
        self.joy_uid.get(pad).copied().unwrap_or(0)
    }

    pub fn set_joy_uid(&mut self, pad: usize, uid: u32) {
        if let Some(slot) = self.joy_uid.get_mut(pad) {
            *slot = uid;
        }
    }

    pub fn sensibility(&self) -> u32 {
        self.sensibility
    }

    /// マウス感度（1..=200）
    pub fn set_sensibility(&mut self, value: u32) {
        self.sensibility = value.clamp(1, 200);
    }

    pub fn ff_intensity(&self) -> u32 {
        self.ff_intensity
    }

    /// 振動強度（0..=0x7FFF）
    pub fn set_ff_intensity(&mut self, value: u32) {
        self.ff_intensity = value.min(DEFAULT_FF_INTENSITY);
    }

    pub fn options(&self, pad: usize) -> PadOptions {
        self.pad_options.get(pad).copied().unwrap_or_default()
    }

    /// 設定ストアから読み込む
    ///
    /// 振動の有無は保存せず、`forcefeedback` の値をそのまま全パッドに使う。
    /// キー割り当ては既定値を入れてから `Button{番号}` で上書きする。
    pub fn load(&mut self, si: &dyn SettingsInterface, forcefeedback: bool, bindings: &mut BindingTable) {
        self.init();
        bindings.clear();
        bindings.apply_defaults();

        for pad in 0..MAX_PADS {
            let section = pad_section(pad);
            self.set_joy_uid(pad, si.get_uint(&section, "JoystickUID", 0));
            let options = &mut self.pad_options[pad];
            options.forcefeedback = forcefeedback;
            options.reverse_lx = si.get_bool(&section, "ReverseLX", false);
            options.reverse_ly = si.get_bool(&section, "ReverseLY", false);
            options.reverse_rx = si.get_bool(&section, "ReverseRX", false);
            options.reverse_ry = si.get_bool(&section, "ReverseRY", false);
            options.mouse_l = si.get_bool(&section, "MouseL", false);
            options.mouse_r = si.get_bool(&section, "MouseR", false);

            for button in VirtualButton::ALL {
                let key = button_key(button);
                if !si.contains(&section, &key) {
                    continue;
                }
                let code = si.get_string(&section, &key, "");
                match code.trim().parse::<u32>() {
                    Ok(code) => {
                        bindings.unbind_button(pad, button);
                        bindings.set_keyboard_key(pad, code, button);
                    }
                    Err(_) => log::warn!("Ignoring binding {}/{} = {:?}", section, key, code),
                }
            }
        }

        self.set_sensibility(si.get_uint("Pad", "MouseSensibility", DEFAULT_SENSIBILITY));
        self.set_ff_intensity(si.get_uint("Pad", "FFIntensity", DEFAULT_FF_INTENSITY));
    }

    /// 設定ストアに書き込む（キー割り当ては含まない）
    pub fn save(&self, si: &mut dyn SettingsInterface) {
        for pad in 0..MAX_PADS {
            let section = pad_section(pad);
            let options = &self.pad_options[pad];
            si.set_uint(&section, "JoystickUID", self.joy_uid[pad]);
            si.set_bool(&section, "ReverseLX", options.reverse_lx);
            si.set_bool(&section, "ReverseLY", options.reverse_ly);
            si.set_bool(&section, "ReverseRX", options.reverse_rx);
            si.set_bool(&section, "ReverseRY", options.reverse_ry);
            si.set_bool(&section, "MouseL", options.mouse_l);
            si.set_bool(&section, "MouseR", options.mouse_r);
        }
        si.set_uint("Pad", "MouseSensibility", self.sensibility);
        si.set_uint("Pad", "FFIntensity", self.ff_intensity);
    }
}

/// 既定の設定を書き込む
pub fn set_default_config(si: &mut dyn SettingsInterface) {
    for pad in 0..MAX_PADS {
        si.remove_section(&pad_section(pad));
    }
    PadConfig::default().save(si);
    for pad in 0..DEFAULT_BINDING_PADS {
        let section = pad_section(pad);
        for (code, button) in DEFAULT_KEYBOARD_BINDINGS {
            si.set_string(&section, &button_key(button), &code.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::JsonSettings;

    #[test]
    fn test_load_empty_store() {
        let si = JsonSettings::new();
        let mut config = PadConfig::default();
        let mut bindings = BindingTable::new();
        config.load(&si, true, &mut bindings);
        assert_eq!(config.sensibility(), DEFAULT_SENSIBILITY);
        assert_eq!(config.ff_intensity(), DEFAULT_FF_INTENSITY);
        assert!(config.options(0).forcefeedback);
        assert!(!config.options(1).reverse_lx);
        assert_eq!(bindings.get_keyboard_key(0, 96), Some(VirtualButton::Cross));
    }

    #[test]
    fn test_load_overrides() {
        let mut si = JsonSettings::new();
        si.set_uint("Pad1", "JoystickUID", 77);
        si.set_bool("Pad1", "ReverseRY", true);
        si.set_string("Pad0", "Button6", "62");
        si.set_string("Pad0", "Button5", "not-a-key");
        si.set_uint("Pad", "MouseSensibility", 900);
        si.set_uint("Pad", "FFIntensity", 0x10000);

        let mut config = PadConfig::default();
        let mut bindings = BindingTable::new();
        config.load(&si, false, &mut bindings);

        assert_eq!(config.joy_uid(1), 77);
        assert!(config.options(1).is_reversed(Axis::RightY));
        assert!(!config.options(1).forcefeedback);
        assert_eq!(bindings.get_keyboard_key(0, 62), Some(VirtualButton::Cross));
        assert_eq!(bindings.get_keyboard_key(0, 96), None);
        assert_eq!(bindings.get_keyboard_key(1, 96), Some(VirtualButton::Cross));
        assert_eq!(bindings.get_keyboard_key(0, 97), Some(VirtualButton::Circle));
        assert_eq!(config.sensibility(), 200);
        assert_eq!(config.ff_intensity(), 0x7FFF);
    }

    #[test]
    fn test_default_config_roundtrip() {
        let mut si = JsonSettings::new();
        si.set_bool("Pad0", "ReverseLX", true);
        set_default_config(&mut si);
        assert!(!si.get_bool("Pad0", "ReverseLX", true));
        assert_eq!(si.get_string("Pad1", "Button11", ""), "108");
        assert!(!si.contains("Pad2", "Button11"));

        let mut config = PadConfig::default();
        let mut bindings = BindingTable::new();
        config.load(&si, false, &mut bindings);
        assert_eq!(config, PadConfig::default());
        assert_eq!(bindings.bindings(0), BindingTable::with_defaults().bindings(0));
    }
}

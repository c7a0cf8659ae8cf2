//! セクション付きキー・バリュー設定ストア
//!
//! パッドとエミュレータの設定は `SettingsInterface` 越しに読み書きする。
//! ファイルに置く場合は JSON 形式（`JsonSettings`）。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 設定ファイルのデフォルトファイル名
pub const SETTINGS_FILENAME: &str = "ps2pad_settings.json";

/// 設定ストアの読み書き機能
pub trait SettingsInterface {
    fn get_value(&self, section: &str, key: &str) -> Option<&Value>;
    fn set_value(&mut self, section: &str, key: &str, value: Value);
    fn remove_section(&mut self, section: &str);

    fn contains(&self, section: &str, key: &str) -> bool {
        self.get_value(section, key).is_some()
    }

    fn get_uint(&self, section: &str, key: &str, default: u32) -> u32 {
        self.get_value(section, key)
            .and_then(|v| match v {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_u64(),
            })
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn get_int(&self, section: &str, key: &str, default: i32) -> i32 {
        self.get_value(section, key)
            .and_then(|v| match v {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_i64(),
            })
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_value(section, key)
            .and_then(|v| match v {
                Value::Bool(b) => Some(*b),
                Value::String(s) => match s.trim() {
                    "true" | "1" => Some(true),
                    "false" | "0" => Some(false),
                    _ => None,
                },
                other => other.as_i64().map(|n| n != 0),
            })
            .unwrap_or(default)
    }

    fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.get_value(section, key)
            .and_then(|v| match v {
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_f64(),
            })
            .map(|v| v as f32)
            .unwrap_or(default)
    }

    fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        match self.get_value(section, key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => default.to_string(),
            Some(other) => other.to_string(),
        }
    }

    fn set_uint(&mut self, section: &str, key: &str, value: u32) {
        self.set_value(section, key, Value::from(value));
    }

    fn set_int(&mut self, section: &str, key: &str, value: i32) {
        self.set_value(section, key, Value::from(value));
    }

    fn set_bool(&mut self, section: &str, key: &str, value: bool) {
        self.set_value(section, key, Value::from(value));
    }

    fn set_float(&mut self, section: &str, key: &str, value: f32) {
        self.set_value(section, key, Value::from(value as f64));
    }

    fn set_string(&mut self, section: &str, key: &str, value: &str) {
        self.set_value(section, key, Value::from(value));
    }
}

/// JSONファイルに保存する設定ストア
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonSettings {
    sections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl JsonSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定したパスから読み込む（読めなければ空）
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Failed to parse settings {:?}: {}, using defaults", path.as_ref(), e);
                    JsonSettings::default()
                }
            },
            Err(_) => JsonSettings::default(),
        }
    }

    /// 指定したパスに保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;
        Ok(())
    }

    /// セクション名の一覧
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

impl SettingsInterface for JsonSettings {
    fn get_value(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    fn set_value(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn remove_section(&mut self, section: &str) {
        self.sections.remove(section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut si = JsonSettings::new();
        si.set_uint("Pad", "FFIntensity", 0x4000);
        si.set_bool("Pad0", "ReverseLX", true);
        si.set_int("EmuCore/Speedhacks", "EECycleRate", -2);
        si.set_float("EmuCore/GS", "upscale_multiplier", 2.0);
        si.set_string("Pad0", "Button6", "96");

        assert_eq!(si.get_uint("Pad", "FFIntensity", 0), 0x4000);
        assert!(si.get_bool("Pad0", "ReverseLX", false));
        assert_eq!(si.get_int("EmuCore/Speedhacks", "EECycleRate", 0), -2);
        assert_eq!(si.get_float("EmuCore/GS", "upscale_multiplier", 1.0), 2.0);
        assert_eq!(si.get_uint("Pad0", "Button6", 0), 96);
        assert_eq!(si.get_string("Pad0", "Button6", ""), "96");
    }

    #[test]
    fn test_defaults_for_missing_or_wrong_type() {
        let mut si = JsonSettings::new();
        si.set_string("Pad", "MouseSensibility", "fast");
        assert_eq!(si.get_uint("Pad", "MouseSensibility", 100), 100);
        assert_eq!(si.get_uint("Pad", "Missing", 7), 7);
        assert!(si.get_bool("Nope", "Nope", true));
        si.set_int("Pad", "Negative", -1);
        assert_eq!(si.get_uint("Pad", "Negative", 5), 5);
    }

    #[test]
    fn test_remove_section() {
        let mut si = JsonSettings::new();
        si.set_bool("Pad1", "MouseL", true);
        assert!(si.contains("Pad1", "MouseL"));
        si.set_uint("Pad", "FFIntensity", 0x4000);
        assert_eq!(si.sections().collect::<Vec<_>>(), vec!["Pad", "Pad1"]);
        si.remove_section("Pad1");
        assert!(!si.contains("Pad1", "MouseL"));
        assert_eq!(si.sections().collect::<Vec<_>>(), vec!["Pad"]);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("ps2pad_settings_test_{}.json", std::process::id()));
        let mut si = JsonSettings::new();
        si.set_uint("Pad0", "JoystickUID", 1234);
        si.save_to(&path).unwrap();
        let loaded = JsonSettings::load_from(&path);
        assert_eq!(loaded, si);
        let _ = fs::remove_file(&path);

        // 存在しないファイルは空
        assert_eq!(JsonSettings::load_from(&path), JsonSettings::new());
    }
}

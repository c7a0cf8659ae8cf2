//! ホストのキーコード → 仮想ボタンの割り当て表

use std::collections::HashMap;

use crate::button::VirtualButton;
use crate::key_status::MAX_PADS;

/// 既定の割り当てを受けるパッド数
pub const DEFAULT_BINDING_PADS: usize = 2;

/// 既定の割り当て（Androidのキーコード）
///
/// 110..=113 と 120..=123 は画面上のスティック用にアプリ側で予約した値。
pub const DEFAULT_KEYBOARD_BINDINGS: [(u32, VirtualButton); 24] = [
    (104, VirtualButton::L2),
    (105, VirtualButton::R2),
    (102, VirtualButton::L1),
    (103, VirtualButton::R1),
    (100, VirtualButton::Triangle),
    (97, VirtualButton::Circle),
    (96, VirtualButton::Cross),
    (99, VirtualButton::Square),
    (109, VirtualButton::Select),
    (106, VirtualButton::L3),
    (107, VirtualButton::R3),
    (108, VirtualButton::Start),
    (19, VirtualButton::Up),
    (22, VirtualButton::Right),
    (20, VirtualButton::Down),
    (21, VirtualButton::Left),
    (110, VirtualButton::LeftStickUp),
    (111, VirtualButton::LeftStickRight),
    (112, VirtualButton::LeftStickDown),
    (113, VirtualButton::LeftStickLeft),
    (120, VirtualButton::RightStickUp),
    (121, VirtualButton::RightStickRight),
    (122, VirtualButton::RightStickDown),
    (123, VirtualButton::RightStickLeft),
];

/// パッドごとの割り当て表
///
/// 同じキーコードを複数のパッドに割り当ててよい（1台のキーボードを
/// 2人で分ける場合など）。
#[derive(Debug, Clone)]
pub struct BindingTable {
    pads: Vec<HashMap<u32, VirtualButton>>,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingTable {
    /// 空の割り当て表
    pub fn new() -> Self {
        BindingTable {
            pads: vec![HashMap::new(); MAX_PADS],
        }
    }

    /// 既定の割り当てを入れた表
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.apply_defaults();
        table
    }

    /// 割り当てを登録（既存の割り当ては上書き）
    pub fn set_keyboard_key(&mut self, pad: usize, host_code: u32, button: VirtualButton) {
        if let Some(map) = self.pads.get_mut(pad) {
            map.insert(host_code, button);
        }
    }

    /// キーコードに割り当てられたボタン
    pub fn get_keyboard_key(&self, pad: usize, host_code: u32) -> Option<VirtualButton> {
        self.pads.get(pad).and_then(|map| map.get(&host_code).copied())
    }

    /// ボタンに割り当てられたキーコードを外す
    pub fn unbind_button(&mut self, pad: usize, button: VirtualButton) {
        if let Some(map) = self.pads.get_mut(pad) {
            map.retain(|_, b| *b != button);
        }
    }

    /// 全割り当てを消去
    pub fn clear(&mut self) {
        for map in &mut self.pads {
            map.clear();
        }
    }

    /// 既定の割り当てを書き込む
    pub fn apply_defaults(&mut self) {
        for pad in 0..DEFAULT_BINDING_PADS {
            for (code, button) in DEFAULT_KEYBOARD_BINDINGS {
                self.set_keyboard_key(pad, code, button);
            }
        }
    }

    /// パッドの割り当て一覧（ボタン番号順）
    pub fn bindings(&self, pad: usize) -> Vec<(u32, VirtualButton)> {
        let mut list: Vec<(u32, VirtualButton)> = self
            .pads
            .get(pad)
            .map(|map| map.iter().map(|(code, button)| (*code, *button)).collect())
            .unwrap_or_default();
        list.sort_by_key(|(code, button)| (*button, *code));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_overwrite() {
        let mut table = BindingTable::new();
        assert_eq!(table.get_keyboard_key(0, 96), None);
        table.set_keyboard_key(0, 96, VirtualButton::Cross);
        assert_eq!(table.get_keyboard_key(0, 96), Some(VirtualButton::Cross));
        table.set_keyboard_key(0, 96, VirtualButton::Circle);
        assert_eq!(table.get_keyboard_key(0, 96), Some(VirtualButton::Circle));
        assert_eq!(table.get_keyboard_key(1, 96), None);
    }

    #[test]
    fn test_same_code_on_multiple_pads() {
        let mut table = BindingTable::new();
        table.set_keyboard_key(0, 62, VirtualButton::Start);
        table.set_keyboard_key(1, 62, VirtualButton::Select);
        assert_eq!(table.get_keyboard_key(0, 62), Some(VirtualButton::Start));
        assert_eq!(table.get_keyboard_key(1, 62), Some(VirtualButton::Select));
    }

    #[test]
    fn test_out_of_range_pad() {
        let mut table = BindingTable::new();
        table.set_keyboard_key(MAX_PADS, 1, VirtualButton::Cross);
        assert_eq!(table.get_keyboard_key(MAX_PADS, 1), None);
    }

    #[test]
    fn test_defaults() {
        let table = BindingTable::with_defaults();
        assert_eq!(table.get_keyboard_key(0, 96), Some(VirtualButton::Cross));
        assert_eq!(table.get_keyboard_key(1, 113), Some(VirtualButton::LeftStickLeft));
        assert_eq!(table.get_keyboard_key(2, 96), None);
        assert_eq!(table.bindings(0).len(), 24);
        assert_eq!(table.bindings(0)[0], (104, VirtualButton::L2));
    }

    #[test]
    fn test_clear_and_unbind() {
        let mut table = BindingTable::with_defaults();
        table.unbind_button(0, VirtualButton::Cross);
        assert_eq!(table.get_keyboard_key(0, 96), None);
        assert_eq!(table.get_keyboard_key(1, 96), Some(VirtualButton::Cross));
        table.clear();
        assert!(table.bindings(1).is_empty());
    }
}

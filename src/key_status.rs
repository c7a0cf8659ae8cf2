//! 仮想パッドの入力状態
//!
//! キーボード（画面上のボタン・ホストのキー）由来の入力と
//! 物理ゲームパッド由来の入力を別々に保持し、読み出し時に合成する。
//! どちらに書き込むかは直前の `keyboard_state_access` /
//! `joystick_state_access` で切り替える。

use crate::button::{Axis, Buttons, VirtualButton, MAX_KEYS};

/// 論理パッド数（2ポート × マルチタップ4スロット）
pub const MAX_PADS: usize = 8;

/// アナログ値の最大絶対値
pub const MAX_ANALOG_VALUE: u32 = 32766;

/// 感圧ボタンの既定値（全押し）
pub const DEFAULT_PRESSURE: u32 = 0xFF;

/// ニュートラル時に報告するアナログ軸の値
pub const ANALOG_RELEASED: u8 = 0x7F;

/// ポートとスロットから論理パッド番号を得る
///
/// スロット0の2台が0番と1番になる。
pub fn pad_index(port: usize, slot: usize) -> usize {
    slot * 2 + port
}

/// スティックの符号付き値（左・上が負）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalogAxes {
    pub lx: i32,
    pub ly: i32,
    pub rx: i32,
    pub ry: i32,
}

impl AnalogAxes {
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::LeftX => self.lx,
            Axis::LeftY => self.ly,
            Axis::RightX => self.rx,
            Axis::RightY => self.ry,
        }
    }

    pub fn set(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::LeftX => self.lx = value,
            Axis::LeftY => self.ly = value,
            Axis::RightX => self.rx = value,
            Axis::RightY => self.ry = value,
        }
    }
}

/// 符号付き軸値を報告用バイトに変換
///
/// 通常:   左 0x00 -> 0x80 -> 0xFF 右
/// 反転:   左 0xFF -> 0x7F -> 0x00 右
pub fn axis_to_byte(value: i32, reversed: bool) -> u8 {
    if value == 0 {
        return ANALOG_RELEASED;
    }
    let limit = MAX_ANALOG_VALUE as i32;
    let force = value.clamp(-limit, limit) >> 8;
    if reversed {
        (0x7F - force) as u8
    } else {
        (0x80 + force) as u8
    }
}

/// 全論理パッドの入力状態
#[derive(Debug, Clone)]
pub struct KeyStatus {
    buttons_kbd: [Buttons; MAX_PADS],
    buttons_joy: [Buttons; MAX_PADS],
    analog_kbd: [AnalogAxes; MAX_PADS],
    analog_joy: [AnalogAxes; MAX_PADS],
    pressure: [[u8; MAX_KEYS]; MAX_PADS],
    keyboard_access: [bool; MAX_PADS],
}

impl Default for KeyStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStatus {
    pub fn new() -> Self {
        KeyStatus {
            buttons_kbd: [Buttons::empty(); MAX_PADS],
            buttons_joy: [Buttons::empty(); MAX_PADS],
            analog_kbd: [AnalogAxes::default(); MAX_PADS],
            analog_joy: [AnalogAxes::default(); MAX_PADS],
            pressure: [[DEFAULT_PRESSURE as u8; MAX_KEYS]; MAX_PADS],
            keyboard_access: [false; MAX_PADS],
        }
    }

    /// 全パッドをニュートラルに戻す
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// 次の更新がキーボード由来であることを記録
    pub fn keyboard_state_access(&mut self, pad: usize) {
        if pad < MAX_PADS {
            self.keyboard_access[pad] = true;
        }
    }

    /// 次の更新が物理デバイス由来であることを記録
    pub fn joystick_state_access(&mut self, pad: usize) {
        if pad < MAX_PADS {
            self.keyboard_access[pad] = false;
        }
    }

    /// ボタンを押す
    ///
    /// デジタルボタンでは `value` は感圧値（0..=255に丸める）。
    /// アナログ方向では `value` は大きさで、方向に応じて符号を付けて記録する。
    /// 範囲外のパッド番号は無視する。
    pub fn press(&mut self, pad: usize, button: VirtualButton, value: u32) {
        if pad >= MAX_PADS {
            return;
        }
        let keyboard = self.keyboard_access[pad];
        match button.axis() {
            Some(axis) => {
                let magnitude = value.min(MAX_ANALOG_VALUE) as i32;
                let signed = if button.is_negative_direction() { -magnitude } else { magnitude };
                let axes = if keyboard { &mut self.analog_kbd[pad] } else { &mut self.analog_joy[pad] };
                axes.set(axis, signed);
            }
            None => {
                self.pressure[pad][button.index()] = value.min(0xFF) as u8;
                let mask = if keyboard { &mut self.buttons_kbd[pad] } else { &mut self.buttons_joy[pad] };
                mask.insert(Buttons::from_button(button));
            }
        }
    }

    /// ボタンを離す（アナログ方向は軸をニュートラルに）
    pub fn release(&mut self, pad: usize, button: VirtualButton) {
        if pad >= MAX_PADS {
            return;
        }
        let keyboard = self.keyboard_access[pad];
        match button.axis() {
            Some(axis) => {
                let axes = if keyboard { &mut self.analog_kbd[pad] } else { &mut self.analog_joy[pad] };
                axes.set(axis, 0);
            }
            None => {
                let mask = if keyboard { &mut self.buttons_kbd[pad] } else { &mut self.buttons_joy[pad] };
                mask.remove(Buttons::from_button(button));
            }
        }
    }

    /// 押されているデジタルボタン（両入力源の合成）
    pub fn buttons(&self, pad: usize) -> Buttons {
        if pad >= MAX_PADS {
            return Buttons::empty();
        }
        self.buttons_kbd[pad] | self.buttons_joy[pad]
    }

    /// スティック値（キーボード側がニュートラルでなければそちらを優先）
    pub fn analog(&self, pad: usize) -> AnalogAxes {
        if pad >= MAX_PADS {
            return AnalogAxes::default();
        }
        let kbd = self.analog_kbd[pad];
        let joy = self.analog_joy[pad];
        let mut merged = AnalogAxes::default();
        for axis in Axis::ALL {
            let value = if kbd.get(axis) != 0 { kbd.get(axis) } else { joy.get(axis) };
            merged.set(axis, value);
        }
        merged
    }

    /// 軸の符号付き値
    pub fn axis(&self, pad: usize, axis: Axis) -> i32 {
        self.analog(pad).get(axis)
    }

    /// 報告用の軸バイト
    pub fn axis_byte(&self, pad: usize, axis: Axis, reversed: bool) -> u8 {
        axis_to_byte(self.axis(pad, axis), reversed)
    }

    /// ボタンが押されているか
    ///
    /// アナログ方向はその方向に倒れているときに真。
    pub fn is_pressed(&self, pad: usize, button: VirtualButton) -> bool {
        match button.axis() {
            Some(axis) => {
                let value = self.axis(pad, axis);
                if button.is_negative_direction() { value < 0 } else { value > 0 }
            }
            None => self.buttons(pad).contains(Buttons::from_button(button)),
        }
    }

    /// 感圧値（押されていなければ0）
    pub fn pressure(&self, pad: usize, button: VirtualButton) -> u8 {
        if pad >= MAX_PADS || button.is_analog() || !self.is_pressed(pad, button) {
            return 0;
        }
        self.pressure[pad][button.index()]
    }
}

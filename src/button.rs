//! 仮想ボタン定義
//!
//! PS2コントローラのボタン番号はセーブステートと設定ファイルに
//! 数値で書き込まれるため、並びを変えてはいけない。
//! 0..=15 がデジタルボタン（SIOの応答ビット位置と一致）、
//! 16..=23 がアナログスティックの方向。

use serde::{Deserialize, Serialize};

/// ボタン数（アナログ方向を含む）
pub const MAX_KEYS: usize = 24;

/// デジタルボタン数
pub const DIGITAL_KEYS: usize = 16;

/// 仮想ボタン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum VirtualButton {
    L2 = 0,
    R2 = 1,
    L1 = 2,
    R1 = 3,
    Triangle = 4,
    Circle = 5,
    Cross = 6,
    Square = 7,
    Select = 8,
    L3 = 9,
    R3 = 10,
    Start = 11,
    Up = 12,
    Right = 13,
    Down = 14,
    Left = 15,
    LeftStickUp = 16,
    LeftStickRight = 17,
    LeftStickDown = 18,
    LeftStickLeft = 19,
    RightStickUp = 20,
    RightStickRight = 21,
    RightStickDown = 22,
    RightStickLeft = 23,
}

/// アナログ軸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl VirtualButton {
    /// 全ボタン（番号順）
    pub const ALL: [VirtualButton; MAX_KEYS] = [
        VirtualButton::L2,
        VirtualButton::R2,
        VirtualButton::L1,
        VirtualButton::R1,
        VirtualButton::Triangle,
        VirtualButton::Circle,
        VirtualButton::Cross,
        VirtualButton::Square,
        VirtualButton::Select,
        VirtualButton::L3,
        VirtualButton::R3,
        VirtualButton::Start,
        VirtualButton::Up,
        VirtualButton::Right,
        VirtualButton::Down,
        VirtualButton::Left,
        VirtualButton::LeftStickUp,
        VirtualButton::LeftStickRight,
        VirtualButton::LeftStickDown,
        VirtualButton::LeftStickLeft,
        VirtualButton::RightStickUp,
        VirtualButton::RightStickRight,
        VirtualButton::RightStickDown,
        VirtualButton::RightStickLeft,
    ];

    /// 番号から変換
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// アナログスティックの方向か
    pub fn is_analog(self) -> bool {
        self.index() >= DIGITAL_KEYS
    }

    /// 負方向（左・上）か
    ///
    /// 1本の軸を向かい合う2つのボタンで表すため、
    /// 左と上は負の値、右と下は正の値として記録する。
    pub fn is_negative_direction(self) -> bool {
        matches!(
            self,
            VirtualButton::LeftStickLeft
                | VirtualButton::LeftStickUp
                | VirtualButton::RightStickLeft
                | VirtualButton::RightStickUp
        )
    }

    /// 対応するアナログ軸
    pub fn axis(self) -> Option<Axis> {
        match self {
            VirtualButton::LeftStickLeft | VirtualButton::LeftStickRight => Some(Axis::LeftX),
            VirtualButton::LeftStickUp | VirtualButton::LeftStickDown => Some(Axis::LeftY),
            VirtualButton::RightStickLeft | VirtualButton::RightStickRight => Some(Axis::RightX),
            VirtualButton::RightStickUp | VirtualButton::RightStickDown => Some(Axis::RightY),
            _ => None,
        }
    }

    /// 表示名
    pub fn name(self) -> &'static str {
        match self {
            VirtualButton::L2 => "L2",
            VirtualButton::R2 => "R2",
            VirtualButton::L1 => "L1",
            VirtualButton::R1 => "R1",
            VirtualButton::Triangle => "Triangle",
            VirtualButton::Circle => "Circle",
            VirtualButton::Cross => "Cross",
            VirtualButton::Square => "Square",
            VirtualButton::Select => "Select",
            VirtualButton::L3 => "L3",
            VirtualButton::R3 => "R3",
            VirtualButton::Start => "Start",
            VirtualButton::Up => "Up",
            VirtualButton::Right => "Right",
            VirtualButton::Down => "Down",
            VirtualButton::Left => "Left",
            VirtualButton::LeftStickUp => "L-Up",
            VirtualButton::LeftStickRight => "L-Right",
            VirtualButton::LeftStickDown => "L-Down",
            VirtualButton::LeftStickLeft => "L-Left",
            VirtualButton::RightStickUp => "R-Up",
            VirtualButton::RightStickRight => "R-Right",
            VirtualButton::RightStickDown => "R-Down",
            VirtualButton::RightStickLeft => "R-Left",
        }
    }
}

impl std::fmt::Display for VirtualButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY];

    /// 負方向のボタン
    pub fn negative(self) -> VirtualButton {
        match self {
            Axis::LeftX => VirtualButton::LeftStickLeft,
            Axis::LeftY => VirtualButton::LeftStickUp,
            Axis::RightX => VirtualButton::RightStickLeft,
            Axis::RightY => VirtualButton::RightStickUp,
        }
    }

    /// 正方向のボタン
    pub fn positive(self) -> VirtualButton {
        match self {
            Axis::LeftX => VirtualButton::LeftStickRight,
            Axis::LeftY => VirtualButton::LeftStickDown,
            Axis::RightX => VirtualButton::RightStickRight,
            Axis::RightY => VirtualButton::RightStickDown,
        }
    }
}

bitflags::bitflags! {
    /// 押されているデジタルボタン（1 = 押下）
    ///
    /// ビット位置は `VirtualButton` の番号と同じ。
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Buttons: u16 {
        const L2       = 1 << 0;
        const R2       = 1 << 1;
        const L1       = 1 << 2;
        const R1       = 1 << 3;
        const TRIANGLE = 1 << 4;
        const CIRCLE   = 1 << 5;
        const CROSS    = 1 << 6;
        const SQUARE   = 1 << 7;
        const SELECT   = 1 << 8;
        const L3       = 1 << 9;
        const R3       = 1 << 10;
        const START    = 1 << 11;
        const UP       = 1 << 12;
        const RIGHT    = 1 << 13;
        const DOWN     = 1 << 14;
        const LEFT     = 1 << 15;
    }
}

impl Buttons {
    /// デジタルボタン1つ分のマスク（アナログ方向は空）
    pub fn from_button(button: VirtualButton) -> Self {
        if button.is_analog() {
            Buttons::empty()
        } else {
            Buttons::from_bits_truncate(1 << button.index())
        }
    }

    /// SIO応答用のアクティブローな値
    pub fn active_low(self) -> u16 {
        !self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for (i, button) in VirtualButton::ALL.iter().enumerate() {
            assert_eq!(button.index(), i);
            assert_eq!(VirtualButton::from_index(i as u32), Some(*button));
        }
        assert_eq!(VirtualButton::from_index(24), None);
    }

    #[test]
    fn test_analog_directions() {
        assert!(!VirtualButton::Left.is_analog());
        assert!(VirtualButton::LeftStickLeft.is_analog());
        assert!(VirtualButton::LeftStickLeft.is_negative_direction());
        assert!(VirtualButton::RightStickUp.is_negative_direction());
        assert!(!VirtualButton::LeftStickDown.is_negative_direction());
        for axis in Axis::ALL {
            assert_eq!(axis.negative().axis(), Some(axis));
            assert_eq!(axis.positive().axis(), Some(axis));
        }
    }

    #[test]
    fn test_button_mask() {
        assert_eq!(Buttons::from_button(VirtualButton::Cross), Buttons::CROSS);
        assert_eq!(Buttons::from_button(VirtualButton::Left), Buttons::LEFT);
        assert!(Buttons::from_button(VirtualButton::LeftStickUp).is_empty());
        assert_eq!(Buttons::empty().active_low(), 0xFFFF);
        assert_eq!((Buttons::START | Buttons::L2).active_low(), 0xF7FE);
    }
}

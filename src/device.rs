//! 物理ゲームパッドの抽象化
//!
//! パッド本体はホストのAPIに直接触れず、`DeviceProvider` から
//! デバイス一覧・ホットプラグ通知・状態スナップショットだけを受け取る。
//!
//! ## gilrs を使う場合:
//!
//! ### Ubuntu/Debian:
//! ```bash
//! sudo apt-get install libudev-dev
//! cargo build --release --features gamepad
//! ```

use crate::button::Buttons;
use crate::key_status::AnalogAxes;

/// デバイス識別子（プロバイダ内で一意）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

/// 列挙されたデバイス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    /// 設定ファイルの JoystickUID と照合する値
    pub uid: u32,
    pub supports_force_feedback: bool,
}

/// ホットプラグ通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Added(DeviceId),
    Removed(DeviceId),
}

/// デバイスの現在の状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub buttons: Buttons,
    /// 符号付き（左・上が負）、絶対値は MAX_ANALOG_VALUE まで
    pub axes: AnalogAxes,
}

/// プラットフォーム側が提供するデバイス機能
pub trait DeviceProvider {
    /// 接続中のデバイス一覧
    fn enumerate(&mut self) -> Vec<DeviceInfo>;

    /// 溜まっている通知を取り出す（入力状態の更新もここで行う）
    fn poll_events(&mut self) -> Vec<HotplugEvent>;

    /// 状態のスナップショット
    fn snapshot(&self, id: DeviceId) -> Option<DeviceSnapshot>;

    /// 振動（small / large: 0..=255、intensity: 0..=0x7FFF）
    fn set_vibration(&mut self, _id: DeviceId, _small: u8, _large: u8, _intensity: u32) {}
}

impl<T: DeviceProvider + ?Sized> DeviceProvider for Box<T> {
    fn enumerate(&mut self) -> Vec<DeviceInfo> {
        (**self).enumerate()
    }

    fn poll_events(&mut self) -> Vec<HotplugEvent> {
        (**self).poll_events()
    }

    fn snapshot(&self, id: DeviceId) -> Option<DeviceSnapshot> {
        (**self).snapshot(id)
    }

    fn set_vibration(&mut self, id: DeviceId, small: u8, large: u8, intensity: u32) {
        (**self).set_vibration(id, small, large, intensity)
    }
}

/// デバイスなし
#[derive(Debug, Default)]
pub struct NullDevices;

impl DeviceProvider for NullDevices {
    fn enumerate(&mut self) -> Vec<DeviceInfo> {
        Vec::new()
    }

    fn poll_events(&mut self) -> Vec<HotplugEvent> {
        Vec::new()
    }

    fn snapshot(&self, _id: DeviceId) -> Option<DeviceSnapshot> {
        None
    }
}

/// 既定のプロバイダ（gamepad 機能が有効なら gilrs、なければなし）
pub fn default_provider() -> Box<dyn DeviceProvider> {
    #[cfg(feature = "gamepad")]
    {
        match GilrsDevices::new() {
            Ok(devices) => return Box::new(devices),
            Err(e) => log::debug!("Gamepad not available: {}", e),
        }
    }
    Box::new(NullDevices)
}

// gilrs バックエンド: 接続ゲームパッドの列挙、ホットプラグ、入力スナップショット、振動

#[cfg(feature = "gamepad")]
pub use self::gilrs_backend::GilrsDevices;

#[cfg(feature = "gamepad")]
mod gilrs_backend {
    use std::collections::HashMap;

    use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder};
    use gilrs::{Axis as GilrsAxis, Button, Event, EventType, GamepadId, Gilrs};

    use super::*;
    use crate::button::{Axis, VirtualButton};
    use crate::key_status::MAX_ANALOG_VALUE;

    /// デッドゾーン
    const DEAD_ZONE: f32 = 0.15;

    pub struct GilrsDevices {
        gilrs: Gilrs,
        ids: HashMap<DeviceId, GamepadId>,
        effects: HashMap<DeviceId, Effect>,
    }

    impl GilrsDevices {
        pub fn new() -> Result<Self, String> {
            let gilrs = Gilrs::new().map_err(|e| format!("Failed to initialize gamepad: {}", e))?;
            Ok(GilrsDevices {
                gilrs,
                ids: HashMap::new(),
                effects: HashMap::new(),
            })
        }

        fn map_button(button: Button) -> Option<VirtualButton> {
            let mapped = match button {
                Button::South => VirtualButton::Cross,
                Button::East => VirtualButton::Circle,
                Button::West => VirtualButton::Square,
                Button::North => VirtualButton::Triangle,
                Button::LeftTrigger => VirtualButton::L1,
                Button::RightTrigger => VirtualButton::R1,
                Button::LeftTrigger2 => VirtualButton::L2,
                Button::RightTrigger2 => VirtualButton::R2,
                Button::LeftThumb => VirtualButton::L3,
                Button::RightThumb => VirtualButton::R3,
                Button::Start => VirtualButton::Start,
                Button::Select => VirtualButton::Select,
                Button::DPadUp => VirtualButton::Up,
                Button::DPadRight => VirtualButton::Right,
                Button::DPadDown => VirtualButton::Down,
                Button::DPadLeft => VirtualButton::Left,
                _ => return None,
            };
            Some(mapped)
        }

        fn scale_axis(value: f32) -> i32 {
            if value.abs() < DEAD_ZONE {
                0
            } else {
                (value.clamp(-1.0, 1.0) * MAX_ANALOG_VALUE as f32) as i32
            }
        }
    }

    impl DeviceProvider for GilrsDevices {
        fn enumerate(&mut self) -> Vec<DeviceInfo> {
            self.ids.clear();
            let mut list = Vec::new();
            for (gid, gamepad) in self.gilrs.gamepads() {
                let id = DeviceId(usize::from(gid));
                let uuid = gamepad.uuid();
                // UUIDを32bitに畳み込む
                let uid = uuid
                    .chunks(4)
                    .fold(0u32, |acc, c| acc ^ u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
                log::info!("Gamepad detected: {} ({:?})", gamepad.name(), gid);
                self.ids.insert(id, gid);
                list.push(DeviceInfo {
                    id,
                    name: gamepad.name().to_string(),
                    uid,
                    supports_force_feedback: gamepad.is_ff_supported(),
                });
            }
            if list.is_empty() {
                log::info!("No gamepad detected (will auto-detect when connected)");
            }
            list
        }

        fn poll_events(&mut self) -> Vec<HotplugEvent> {
            let mut events = Vec::new();
            while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
                match event {
                    EventType::Connected => events.push(HotplugEvent::Added(DeviceId(usize::from(id)))),
                    EventType::Disconnected => {
                        let device = DeviceId(usize::from(id));
                        self.effects.remove(&device);
                        events.push(HotplugEvent::Removed(device));
                    }
                    _ => {}
                }
            }
            events
        }

        fn snapshot(&self, id: DeviceId) -> Option<DeviceSnapshot> {
            let gid = *self.ids.get(&id)?;
            let gamepad = self.gilrs.connected_gamepad(gid)?;
            let mut snapshot = DeviceSnapshot::default();
            for button in [
                Button::South,
                Button::East,
                Button::West,
                Button::North,
                Button::LeftTrigger,
                Button::RightTrigger,
                Button::LeftTrigger2,
                Button::RightTrigger2,
                Button::LeftThumb,
                Button::RightThumb,
                Button::Start,
                Button::Select,
                Button::DPadUp,
                Button::DPadRight,
                Button::DPadDown,
                Button::DPadLeft,
            ] {
                if gamepad.is_pressed(button) {
                    if let Some(mapped) = Self::map_button(button) {
                        snapshot.buttons.insert(Buttons::from_button(mapped));
                    }
                }
            }
            // Y軸は反転（PS2は上が負）
            snapshot.axes.set(Axis::LeftX, Self::scale_axis(gamepad.value(GilrsAxis::LeftStickX)));
            snapshot.axes.set(Axis::LeftY, Self::scale_axis(-gamepad.value(GilrsAxis::LeftStickY)));
            snapshot.axes.set(Axis::RightX, Self::scale_axis(gamepad.value(GilrsAxis::RightStickX)));
            snapshot.axes.set(Axis::RightY, Self::scale_axis(-gamepad.value(GilrsAxis::RightStickY)));
            Some(snapshot)
        }

        fn set_vibration(&mut self, id: DeviceId, small: u8, large: u8, intensity: u32) {
            let Some(gid) = self.ids.get(&id).copied() else {
                return;
            };
            self.effects.remove(&id);
            if small == 0 && large == 0 {
                return;
            }
            let scale = |v: u8| ((v as u32 * intensity.min(0x7FFF) * 2) / 0xFF).min(u16::MAX as u32) as u16;
            let built = EffectBuilder::new()
                .add_effect(BaseEffect {
                    kind: BaseEffectType::Strong { magnitude: scale(large) },
                    ..Default::default()
                })
                .add_effect(BaseEffect {
                    kind: BaseEffectType::Weak { magnitude: scale(small) },
                    ..Default::default()
                })
                .gamepads(&[gid])
                .finish(&mut self.gilrs);
            match built {
                Ok(effect) => {
                    if let Err(e) = effect.play() {
                        log::debug!("Force feedback failed: {}", e);
                        return;
                    }
                    self.effects.insert(id, effect);
                }
                Err(e) => log::debug!("Force feedback unavailable: {}", e),
            }
        }
    }
}

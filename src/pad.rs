//! パッドサブシステム本体
//!
//! 入力状態・キー割り当て・設定・ポートごとのコントローラ状態を
//! 1つの `PadContext` にまとめて持つ。
//! エミュレーションコアからは open / close / poll / freeze / set_slot /
//! start_poll / poll、UI側からは入力イベントと振動設定が呼ばれる。

use crate::bindings::BindingTable;
use crate::button::{Axis, Buttons, VirtualButton};
use crate::config::{self, PadConfig};
use crate::device::{DeviceId, DeviceInfo, DeviceProvider};
use crate::freeze::{FreezeAction, FreezeError, FrozenMode, PadFullFreezeData, FREEZE_SIZE, PORTS, SLOTS};
use crate::key_status::{pad_index, KeyStatus, DEFAULT_PRESSURE, MAX_PADS};
use crate::protocol::{InputReport, PadState, QueryInfo, PRESSURE_KEYS};
use crate::settings::SettingsInterface;

/// ネイティブモードで報告する感圧ボタンの順序
const PRESSURE_ORDER: [VirtualButton; PRESSURE_KEYS] = [
    VirtualButton::Right,
    VirtualButton::Left,
    VirtualButton::Up,
    VirtualButton::Down,
    VirtualButton::Triangle,
    VirtualButton::Circle,
    VirtualButton::Cross,
    VirtualButton::Square,
    VirtualButton::L1,
    VirtualButton::R1,
    VirtualButton::L2,
    VirtualButton::R2,
];

/// 描画先ウィンドウの情報
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowInfo {
    /// プラットフォーム側のハンドル（0 はなし）
    pub handle: usize,
    pub surface_width: u32,
    pub surface_height: u32,
    pub surface_scale: f32,
}

impl WindowInfo {
    pub fn has_surface(&self) -> bool {
        self.handle != 0
    }
}

/// ホスト入力イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyEventType {
    NoEvent,
    KeyPressed,
    KeyReleased,
    MousePressed,
    MouseReleased,
    MouseMove,
    FocusGained,
    FocusLost,
}

/// ホスト入力イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostKeyEvent {
    pub kind: HostKeyEventType,
    pub key: u32,
    /// アナログ方向の大きさ（デジタルボタンでは使わない）
    pub range: u32,
}

impl HostKeyEvent {
    pub fn pressed(key: u32, range: u32) -> Self {
        HostKeyEvent { kind: HostKeyEventType::KeyPressed, key, range }
    }

    pub fn released(key: u32) -> Self {
        HostKeyEvent { kind: HostKeyEventType::KeyReleased, key, range: 0 }
    }
}

/// パッドサブシステムの状態一式
pub struct PadContext<D: DeviceProvider> {
    key_status: KeyStatus,
    bindings: BindingTable,
    config: PadConfig,
    pads: [[PadState; SLOTS]; PORTS],
    slots: [u8; PORTS],
    query: QueryInfo,
    forcefeedback: bool,
    devices: D,
    enumerated: Vec<DeviceInfo>,
    assignment: [Option<DeviceId>; MAX_PADS],
}

impl<D: DeviceProvider> PadContext<D> {
    pub fn new(devices: D) -> Self {
        PadContext {
            key_status: KeyStatus::new(),
            bindings: BindingTable::with_defaults(),
            config: PadConfig::default(),
            pads: Default::default(),
            slots: [0; PORTS],
            query: QueryInfo::default(),
            forcefeedback: false,
            devices,
            enumerated: Vec::new(),
            assignment: [None; MAX_PADS],
        }
    }

    // ─── Lifecycle ────────────────────────────────────────────

    /// コントローラ状態・問い合わせ・アクティブスロットを初期化
    pub fn init(&mut self) {
        for port in &mut self.pads {
            for pad in port {
                pad.reset();
            }
        }
        self.query.reset();
        self.slots = [0; PORTS];
        self.shutdown();
    }

    /// 振動を止める
    pub fn shutdown(&mut self) {
        for (pad, device) in self.assignment.iter().enumerate() {
            if let Some(id) = device {
                if self.config.options(pad).forcefeedback {
                    self.devices.set_vibration(*id, 0, 0, 0);
                }
            }
        }
    }

    /// 入力状態を初期化してデバイスを列挙し直す
    pub fn open(&mut self, window: &WindowInfo) {
        log::debug!(
            "Pad open ({}x{}, surface {})",
            window.surface_width,
            window.surface_height,
            window.has_surface()
        );
        self.key_status.init();
        self.enumerate_devices();
    }

    /// 列挙したデバイスを手放す（入力状態はそのまま）
    pub fn close(&mut self) {
        self.enumerated.clear();
        self.assignment = [None; MAX_PADS];
    }

    /// デバイスを列挙してパッドに割り当てる
    ///
    /// JoystickUID が一致するデバイスを優先し、残りのパッドには
    /// 残ったデバイスを列挙順に割り当てる。
    pub fn enumerate_devices(&mut self) {
        self.enumerated = self.devices.enumerate();
        self.assignment = [None; MAX_PADS];
        let mut taken = vec![false; self.enumerated.len()];

        for pad in 0..MAX_PADS {
            let uid = self.config.joy_uid(pad);
            if uid == 0 {
                continue;
            }
            if let Some(i) = (0..self.enumerated.len()).find(|&i| !taken[i] && self.enumerated[i].uid == uid) {
                taken[i] = true;
                self.assignment[pad] = Some(self.enumerated[i].id);
            }
        }

        let mut free = (0..self.enumerated.len()).filter(|&i| !taken[i]).collect::<Vec<_>>().into_iter();
        for pad in 0..MAX_PADS {
            if self.assignment[pad].is_some() {
                continue;
            }
            match free.next() {
                Some(i) => self.assignment[pad] = Some(self.enumerated[i].id),
                None => break,
            }
        }

        for (pad, device) in self.assignment.iter().enumerate() {
            if let Some(id) = device {
                if let Some(info) = self.enumerated.iter().find(|d| d.id == *id) {
                    log::info!("Pad {} uses device {} (uid {:#010x})", pad, info.name, info.uid);
                }
            }
        }
    }

    /// ホットプラグ通知を処理し、物理デバイスの状態を取り込む
    pub fn poll_devices(&mut self) {
        let events = self.devices.poll_events();
        if !events.is_empty() {
            log::info!("Device change: {:?}", events);
            self.enumerate_devices();
        }

        for pad in 0..MAX_PADS {
            let Some(id) = self.assignment[pad] else {
                continue;
            };
            let Some(snapshot) = self.devices.snapshot(id) else {
                continue;
            };
            self.key_status.joystick_state_access(pad);
            for button in VirtualButton::ALL.into_iter().filter(|b| !b.is_analog()) {
                if snapshot.buttons.contains(Buttons::from_button(button)) {
                    self.key_status.press(pad, button, DEFAULT_PRESSURE);
                } else {
                    self.key_status.release(pad, button);
                }
            }
            for axis in Axis::ALL {
                let value = snapshot.axes.get(axis);
                if value < 0 {
                    self.key_status.press(pad, axis.negative(), value.unsigned_abs());
                } else if value > 0 {
                    self.key_status.press(pad, axis.positive(), value as u32);
                } else {
                    self.key_status.release(pad, axis.positive());
                }
            }
        }

        self.update_vibration();
    }

    /// 変化した振動値をデバイスへ送る
    fn update_vibration(&mut self) {
        let intensity = self.config.ff_intensity();
        for port in 0..PORTS {
            for slot in 0..SLOTS {
                let pad = pad_index(port, slot);
                let state = &mut self.pads[port][slot];
                if state.next_vibrate == state.current_vibrate {
                    continue;
                }
                state.current_vibrate = state.next_vibrate;
                if !self.config.options(pad).forcefeedback {
                    continue;
                }
                if let Some(id) = self.assignment.get(pad).copied().flatten() {
                    let [small, large] = state.current_vibrate;
                    self.devices.set_vibration(id, small, large, intensity);
                }
            }
        }
    }

    /// 全パッドの振動を止める
    pub fn stop_vibrate_all(&mut self) {
        for port in &mut self.pads {
            for pad in port {
                pad.set_vibrate(0, 0);
                pad.set_vibrate(1, 0);
            }
        }
        self.update_vibration();
    }

    /// アクティブスロットを設定（port, slot は1始まり）
    pub fn set_slot(&mut self, port: u8, slot: u8) -> bool {
        let port = port.wrapping_sub(1) as usize;
        let slot = slot.wrapping_sub(1);
        if port >= PORTS || slot as usize >= SLOTS {
            log::debug!("Rejected slot assignment port {} slot {}", port.wrapping_add(1), slot.wrapping_add(1));
            return false;
        }
        // パッドがなくても記録する
        self.slots[port] = slot;
        true
    }

    pub fn slot(&self, port: usize) -> Option<u8> {
        self.slots.get(port).copied()
    }

    // ─── Freeze ───────────────────────────────────────────────

    /// セーブステートの問い合わせ・保存・復元
    ///
    /// どの操作でも成功時は固定サイズを返す。
    /// 復元に失敗した場合は現在の状態を一切変更しない。
    pub fn freeze(&mut self, action: FreezeAction, buffer: &mut [u8]) -> Result<usize, FreezeError> {
        match action {
            FreezeAction::Size => Ok(FREEZE_SIZE),
            FreezeAction::Save => {
                let data = PadFullFreezeData::capture(&self.query, &self.pads, &self.slots);
                data.encode_into(buffer).inspect_err(|e| log::warn!("Pad freeze save failed: {}", e))?;
                Ok(FREEZE_SIZE)
            }
            FreezeAction::Load => {
                let data = PadFullFreezeData::decode(buffer).inspect_err(|e| log::warn!("Pad freeze rejected: {}", e))?;
                self.apply_freeze(data);
                Ok(FREEZE_SIZE)
            }
        }
    }

    /// 生の操作番号で freeze を呼ぶ
    pub fn freeze_raw(&mut self, action: u32, buffer: &mut [u8]) -> Result<usize, FreezeError> {
        let action = FreezeAction::try_from(action)?;
        self.freeze(action, buffer)
    }

    fn apply_freeze(&mut self, data: PadFullFreezeData) {
        self.stop_vibrate_all();

        if data.query.is_consistent(PORTS, SLOTS) {
            self.query = data.query;
        } else {
            log::warn!(
                "Pad freeze query out of range (port {} slot {} byte {}/{}), resetting",
                data.query.port,
                data.query.slot,
                data.query.last_byte,
                data.query.num_bytes
            );
            self.query.reset();
        }

        for port in 0..PORTS {
            for slot in 0..SLOTS {
                let frozen = &data.pads[port][slot];
                let Some(state) = frozen.to_pad_state() else {
                    if let FrozenMode::Unknown(raw) = frozen.mode {
                        log::warn!(
                            "Pad freeze port {} slot {} has unknown mode {:#04x}, keeping slots {}..{}",
                            port,
                            slot,
                            raw,
                            slot,
                            SLOTS
                        );
                    }
                    break;
                };
                self.pads[port][slot] = state;
            }
            if (data.slots[port] as usize) < SLOTS {
                self.slots[port] = data.slots[port];
            }
        }
    }

    // ─── SIO ──────────────────────────────────────────────────

    /// 問い合わせ開始（pad は1始まりのポート番号）
    pub fn start_poll(&mut self, pad: u32) -> u8 {
        let port = pad.wrapping_sub(1) as usize;
        let slot = self.slots.get(port).copied().unwrap_or(0) as usize;
        self.query.start_poll(port, slot)
    }

    /// 1バイト送受信
    pub fn poll(&mut self, value: u8) -> u8 {
        let port = self.query.port as usize;
        let slot = self.query.slot as usize;
        if port >= PORTS || slot >= SLOTS {
            return 0;
        }
        let input = self.input_report(pad_index(port, slot));
        self.query.poll(value, &mut self.pads[port][slot], &input)
    }

    /// 現在の入力を報告用にまとめる
    pub fn input_report(&self, pad: usize) -> InputReport {
        let options = self.config.options(pad);
        let analog = Axis::ALL.map(|axis| self.key_status.axis_byte(pad, axis, options.is_reversed(axis)));
        let pressure = PRESSURE_ORDER.map(|button| self.key_status.pressure(pad, button));
        InputReport {
            buttons: self.key_status.buttons(pad),
            analog,
            pressure,
        }
    }

    // ─── Input ────────────────────────────────────────────────

    /// ホストの入力イベントを割り当てのあるすべてのパッドに配る
    ///
    /// キーの押下・解放なら true（一致する割り当てがなくてもよい）。
    pub fn handle_host_input_event(&mut self, event: &HostKeyEvent) -> bool {
        let pressed = match event.kind {
            HostKeyEventType::KeyPressed => true,
            HostKeyEventType::KeyReleased => false,
            _ => return false,
        };

        for pad in 0..MAX_PADS {
            let Some(button) = self.bindings.get_keyboard_key(pad, event.key) else {
                continue;
            };
            self.key_status.keyboard_state_access(pad);
            if !pressed {
                self.key_status.release(pad, button);
            } else if button.is_analog() {
                self.key_status.press(pad, button, event.range);
            } else {
                self.key_status.press(pad, button, DEFAULT_PRESSURE);
            }
        }
        true
    }

    /// 全パッドをニュートラルに戻す
    pub fn reset_key_status(&mut self) {
        self.key_status.init();
    }

    /// 振動の有効・無効（全パッド）
    pub fn set_vibration(&mut self, enabled: bool) {
        if self.forcefeedback && !enabled {
            self.stop_vibrate_all();
        }
        self.forcefeedback = enabled;
        for options in &mut self.config.pad_options {
            options.forcefeedback = enabled;
        }
    }

    pub fn vibration_enabled(&self) -> bool {
        self.forcefeedback
    }

    // ─── Configuration ────────────────────────────────────────

    /// 設定ストアから読み込む（割り当ても読み直す）
    pub fn load_config(&mut self, si: &dyn SettingsInterface) {
        self.config.load(si, self.forcefeedback, &mut self.bindings);
    }

    pub fn save_config(&self, si: &mut dyn SettingsInterface) {
        self.config.save(si);
    }

    /// 設定ストアを既定値にして読み直す
    pub fn set_default_config(&mut self, si: &mut dyn SettingsInterface) {
        config::set_default_config(si);
        self.load_config(si);
    }

    /// 割り当てを全消去
    pub fn reset_bindings(&mut self) {
        self.bindings.clear();
    }

    /// 既定の割り当てを書き込む（既存の割り当ては残る）
    pub fn apply_default_bindings(&mut self) {
        self.bindings.apply_defaults();
    }

    pub fn set_keyboard_key(&mut self, pad: usize, host_code: u32, button: VirtualButton) {
        self.bindings.set_keyboard_key(pad, host_code, button);
    }

    // ─── Accessors ────────────────────────────────────────────

    pub fn key_status(&self) -> &KeyStatus {
        &self.key_status
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn config(&self) -> &PadConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PadConfig {
        &mut self.config
    }

    pub fn pad_state(&self, port: usize, slot: usize) -> Option<&PadState> {
        self.pads.get(port).and_then(|p| p.get(slot))
    }

    pub fn pad_state_mut(&mut self, port: usize, slot: usize) -> Option<&mut PadState> {
        self.pads.get_mut(port).and_then(|p| p.get_mut(slot))
    }

    pub fn query(&self) -> &QueryInfo {
        &self.query
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.enumerated
    }

    pub fn assigned_device(&self, pad: usize) -> Option<DeviceId> {
        self.assignment.get(pad).copied().flatten()
    }

    pub fn device_provider(&self) -> &D {
        &self.devices
    }
}

//! コントローラのシリアル通信（SIO）プロトコル
//!
//! エミュレーションコアは1回の問い合わせごとに `start_poll` を呼び、
//! 続けて1バイトずつ `poll` を呼ぶ。1バイト目がコマンド、
//! 以降は応答を読みながら引数を送る。
//!
//! 応答の形:
//! - byte 1: モードID（0x41 / 0x73 / 0x79、設定系コマンドは 0xF3）
//! - byte 2: 0x5A
//! - byte 3..: コマンドごとのデータ

use serde::{Deserialize, Serialize};

use crate::button::Buttons;
use crate::key_status::ANALOG_RELEASED;

/// 応答バッファ長
pub const RESPONSE_LEN: usize = 42;

/// 感圧ボタンの報告数（ネイティブモード）
pub const PRESSURE_KEYS: usize = 12;

pub const CMD_SET_VREF_PARAM: u8 = 0x40;
pub const CMD_QUERY_DS2_ANALOG_MODE: u8 = 0x41;
pub const CMD_READ_DATA_AND_VIBRATE: u8 = 0x42;
pub const CMD_CONFIG_MODE: u8 = 0x43;
pub const CMD_SET_MODE_AND_LOCK: u8 = 0x44;
pub const CMD_QUERY_MODEL_AND_MODE: u8 = 0x45;
pub const CMD_QUERY_ACT: u8 = 0x46;
pub const CMD_QUERY_COMB: u8 = 0x47;
pub const CMD_QUERY_MODE: u8 = 0x4C;
pub const CMD_VIBRATION_TOGGLE: u8 = 0x4D;
pub const CMD_SET_DS2_NATIVE_MODE: u8 = 0x4F;

/// 設定系コマンドの応答ID
pub const CONFIG_ID: u8 = 0xF3;

const CONFIG_EXIT: [u8; 7] = [0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const NO_CLUE: [u8; 7] = [0x5A, 0x00, 0x00, 0x02, 0x00, 0x00, 0x5A];
const QUERY_MASK_MODE: [u8; 7] = [0x5A, 0xFF, 0xFF, 0x03, 0x00, 0x00, 0x5A];
const SET_MODE: [u8; 7] = [0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const QUERY_MODEL_DS2: [u8; 7] = [0x5A, 0x03, 0x02, 0x00, 0x02, 0x01, 0x00];
const QUERY_COMB: [u8; 7] = [0x5A, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00];
const QUERY_MODE: [u8; 7] = [0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const SET_NATIVE_MODE: [u8; 7] = [0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x5A];
const QUERY_ACT: [[u8; 7]; 2] = [
    [0x5A, 0x00, 0x00, 0x01, 0x02, 0x00, 0x0A],
    [0x5A, 0x00, 0x00, 0x01, 0x01, 0x01, 0x14],
];

/// コントローラの報告モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadMode {
    /// デジタル（ボタンのみ）
    Digital,
    /// アナログ（スティック付き）
    Analog,
    /// DualShock2ネイティブ（感圧付き）
    NativeAnalog,
}

impl PadMode {
    /// プロトコル上のID
    pub fn id(self) -> u8 {
        match self {
            PadMode::Digital => 0x41,
            PadMode::Analog => 0x73,
            PadMode::NativeAnalog => 0x79,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x41 => Some(PadMode::Digital),
            0x73 => Some(PadMode::Analog),
            0x79 => Some(PadMode::NativeAnalog),
            _ => None,
        }
    }

    /// 読み出しコマンドの応答長
    pub fn reply_len(self) -> u8 {
        (self.id() & 0x0F) * 2 + 3
    }
}

/// 1ポート・1スロット分のコントローラ状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadState {
    pub mode: PadMode,
    pub mode_lock: u8,
    /// 設定モード中なら非0
    pub config: u8,
    /// 振動モーターの割り当てマップ
    pub vibrate: [u8; 8],
    /// 感圧報告マスク
    pub umask: [u8; 3],
    /// 小・大モーターの値が来るバイト位置
    pub vibrate_index: [u8; 2],
    /// 最後にデバイスへ送った振動値
    pub current_vibrate: [u8; 2],
    /// 次に送る振動値
    pub next_vibrate: [u8; 2],
    /// 最後に報告したスティック値（lx, ly, rx, ry）
    pub analog: [u8; 4],
}

impl Default for PadState {
    fn default() -> Self {
        let mut pad = PadState {
            mode: PadMode::Digital,
            mode_lock: 0,
            config: 0,
            vibrate: [0; 8],
            umask: [0xFF, 0xFF, 0x03],
            vibrate_index: [0; 2],
            current_vibrate: [0; 2],
            next_vibrate: [0; 2],
            analog: [ANALOG_RELEASED; 4],
        };
        pad.reset_vibrate();
        pad
    }
}

impl PadState {
    pub fn reset(&mut self) {
        *self = PadState::default();
    }

    /// 振動を止めてモーター割り当てを初期化
    pub fn reset_vibrate(&mut self) {
        self.set_vibrate(0, 0);
        self.set_vibrate(1, 0);
        self.vibrate = [0xFF; 8];
        self.vibrate[0] = 0x5A;
    }

    pub fn set_vibrate(&mut self, motor: usize, strength: u8) {
        if let Some(slot) = self.next_vibrate.get_mut(motor) {
            *slot = strength;
        }
    }

    pub fn set_mode(&mut self, mode: PadMode) {
        self.mode = mode;
    }
}

/// 読み出しコマンドで報告する入力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputReport {
    pub buttons: Buttons,
    /// lx, ly, rx, ry
    pub analog: [u8; 4],
    /// 右, 左, 上, 下, △, ○, ×, □, L1, R1, L2, R2
    pub pressure: [u8; PRESSURE_KEYS],
}

impl Default for InputReport {
    fn default() -> Self {
        InputReport {
            buttons: Buttons::empty(),
            analog: [ANALOG_RELEASED; 4],
            pressure: [0; PRESSURE_KEYS],
        }
    }
}

/// 進行中の問い合わせ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub port: u8,
    pub slot: u8,
    pub last_byte: u8,
    pub current_command: u8,
    pub num_bytes: u8,
    pub query_done: u8,
    pub response: [u8; RESPONSE_LEN],
}

impl Default for QueryInfo {
    fn default() -> Self {
        let mut query = QueryInfo {
            port: 0,
            slot: 0,
            last_byte: 0,
            current_command: 0,
            num_bytes: 0,
            query_done: 0,
            response: [0; RESPONSE_LEN],
        };
        query.reset();
        query
    }
}

impl QueryInfo {
    /// 問い合わせなしの状態に戻す
    pub fn reset(&mut self) {
        self.port = 0;
        self.slot = 0;
        self.last_byte = 1;
        self.current_command = 0;
        self.num_bytes = 0;
        self.query_done = 1;
        self.response = [0; RESPONSE_LEN];
    }

    /// 復元した問い合わせ状態が応答バッファの範囲内か
    pub fn is_consistent(&self, ports: usize, slots: usize) -> bool {
        (self.port as usize) < ports
            && (self.slot as usize) < slots
            && self.num_bytes as usize <= RESPONSE_LEN
            && (self.num_bytes == 0 || self.last_byte < self.num_bytes)
            && self.query_done <= 1
    }

    fn response_at(&self, index: u8) -> u8 {
        self.response.get(index as usize).copied().unwrap_or(0)
    }

    fn set_result(&mut self, result: &[u8; 7]) {
        self.response[2..9].copy_from_slice(result);
        self.num_bytes = 9;
    }

    fn set_final_result(&mut self, result: &[u8; 7]) {
        self.set_result(result);
        self.query_done = 1;
    }

    /// 問い合わせを開始（port, slot は0始まり）
    pub fn start_poll(&mut self, port: usize, slot: usize) -> u8 {
        if port >= 2 || slot >= 4 {
            self.reset();
            return 0;
        }
        self.port = port as u8;
        self.slot = slot as u8;
        self.query_done = 0;
        self.num_bytes = 2;
        self.last_byte = 0;
        0xFF
    }

    /// 1バイト送受信
    pub fn poll(&mut self, value: u8, pad: &mut PadState, input: &InputReport) -> u8 {
        if self.last_byte as usize + 1 >= self.num_bytes as usize {
            return 0;
        }
        if self.last_byte != 0 && self.query_done != 0 {
            self.last_byte = self.last_byte.saturating_add(1);
            return self.response_at(self.last_byte);
        }
        if self.last_byte == 0 {
            self.command(value, pad, input)
        } else {
            self.argument(value, pad)
        }
    }

    fn command(&mut self, value: u8, pad: &mut PadState, input: &InputReport) -> u8 {
        self.last_byte = 1;
        self.current_command = value;

        if pad.config == 0 && value != CMD_READ_DATA_AND_VIBRATE && value != CMD_CONFIG_MODE {
            self.num_bytes = 0;
            self.query_done = 1;
            return CONFIG_ID;
        }

        match value {
            CMD_CONFIG_MODE if pad.config != 0 => {
                // 設定モード中（抜けるとは限らない）
                self.set_result(&CONFIG_EXIT);
            }
            CMD_CONFIG_MODE | CMD_READ_DATA_AND_VIBRATE => {
                return self.read_data(pad, input);
            }
            CMD_SET_VREF_PARAM => self.set_final_result(&NO_CLUE),
            CMD_QUERY_DS2_ANALOG_MODE => {
                let mut result = QUERY_MASK_MODE;
                if pad.mode == PadMode::Digital {
                    result[1] = 0;
                    result[2] = 0;
                    result[3] = 0;
                    result[6] = 0;
                } else {
                    result[1..4].copy_from_slice(&pad.umask);
                }
                self.set_final_result(&result);
            }
            CMD_SET_MODE_AND_LOCK => {
                self.set_result(&SET_MODE);
                pad.reset_vibrate();
            }
            CMD_QUERY_MODEL_AND_MODE => {
                self.set_final_result(&QUERY_MODEL_DS2);
                self.response[5] = if pad.mode == PadMode::Digital { 0 } else { 1 };
            }
            CMD_QUERY_ACT => self.set_result(&QUERY_ACT[0]),
            CMD_QUERY_COMB => self.set_final_result(&QUERY_COMB),
            CMD_QUERY_MODE => self.set_result(&QUERY_MODE),
            CMD_VIBRATION_TOGGLE => {
                self.response[2..9].copy_from_slice(&pad.vibrate[..7]);
                self.num_bytes = 9;
                pad.reset_vibrate();
            }
            CMD_SET_DS2_NATIVE_MODE => self.set_result(&SET_NATIVE_MODE),
            _ => {
                self.num_bytes = 0;
                self.query_done = 1;
            }
        }
        CONFIG_ID
    }

    fn read_data(&mut self, pad: &mut PadState, input: &InputReport) -> u8 {
        let id = pad.mode.id();
        let buttons = input.buttons.active_low();

        self.response[1] = id;
        self.response[2] = 0x5A;
        self.response[3] = (buttons >> 8) as u8;
        self.response[4] = buttons as u8;

        pad.analog = input.analog;
        if pad.mode != PadMode::Digital {
            let [lx, ly, rx, ry] = input.analog;
            self.response[5] = rx;
            self.response[6] = ry;
            self.response[7] = lx;
            self.response[8] = ly;
        }
        if pad.mode == PadMode::NativeAnalog {
            self.response[9..9 + PRESSURE_KEYS].copy_from_slice(&input.pressure);
        }

        self.num_bytes = pad.mode.reply_len();
        id
    }

    fn argument(&mut self, value: u8, pad: &mut PadState) -> u8 {
        self.last_byte = self.last_byte.saturating_add(1);
        let index = self.last_byte;

        match self.current_command {
            CMD_READ_DATA_AND_VIBRATE => {
                if index == pad.vibrate_index[0] {
                    pad.set_vibrate(0, if value & 1 != 0 { 0xFF } else { 0 });
                } else if index == pad.vibrate_index[1] {
                    pad.set_vibrate(1, value);
                }
            }
            CMD_CONFIG_MODE => {
                if index == 3 {
                    self.query_done = 1;
                    pad.config = value;
                }
            }
            CMD_SET_MODE_AND_LOCK => {
                if index == 3 && value < 2 {
                    pad.set_mode(if value == 1 { PadMode::Analog } else { PadMode::Digital });
                } else if index == 4 {
                    pad.mode_lock = if value == 3 { 3 } else { 0 };
                }
            }
            CMD_QUERY_ACT => {
                if index == 3 {
                    if value < 2 {
                        self.set_result(&QUERY_ACT[value as usize]);
                    } else {
                        self.query_done = 1;
                        self.num_bytes = 0;
                    }
                }
            }
            CMD_QUERY_MODE => {
                if index == 3 {
                    if value < 2 {
                        self.response[6] = 4 + value * 3;
                    } else {
                        self.num_bytes = 0;
                    }
                    self.query_done = 1;
                }
            }
            CMD_VIBRATION_TOGGLE => {
                if index >= 3 {
                    if value == 0 {
                        pad.vibrate_index[0] = index;
                    } else if value == 1 {
                        pad.vibrate_index[1] = index;
                    }
                    if let Some(entry) = pad.vibrate.get_mut((index - 2) as usize) {
                        *entry = value;
                    }
                }
            }
            CMD_SET_DS2_NATIVE_MODE => {
                if index == 3 || index == 4 {
                    if let Some(mask) = pad.umask.get_mut((index - 3) as usize) {
                        *mask = value;
                    }
                } else if index == 5 {
                    let mode = if value & 1 == 0 {
                        PadMode::Digital
                    } else if value & 2 == 0 {
                        PadMode::Analog
                    } else {
                        PadMode::NativeAnalog
                    };
                    pad.set_mode(mode);
                }
            }
            _ => {}
        }
        self.response_at(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// コマンド列を送り応答列を返す
    fn transfer(query: &mut QueryInfo, pad: &mut PadState, input: &InputReport, bytes: &[u8]) -> Vec<u8> {
        let mut out = vec![query.start_poll(0, 0)];
        for b in bytes {
            out.push(query.poll(*b, pad, input));
        }
        out
    }

    fn enter_config(query: &mut QueryInfo, pad: &mut PadState, input: &InputReport) {
        transfer(query, pad, input, &[CMD_CONFIG_MODE, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(pad.config, 1);
    }

    #[test]
    fn test_reply_len() {
        assert_eq!(PadMode::Digital.reply_len(), 5);
        assert_eq!(PadMode::Analog.reply_len(), 9);
        assert_eq!(PadMode::NativeAnalog.reply_len(), 21);
    }

    #[test]
    fn test_digital_read() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let input = InputReport {
            buttons: Buttons::CROSS | Buttons::START,
            ..InputReport::default()
        };
        let out = transfer(&mut query, &mut pad, &input, &[CMD_READ_DATA_AND_VIBRATE, 0, 0, 0, 0]);
        assert_eq!(out, vec![0xFF, 0x41, 0x5A, 0xF7, 0xBF, 0x00]);
    }

    #[test]
    fn test_analog_read() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        pad.set_mode(PadMode::Analog);
        let input = InputReport {
            analog: [0x10, 0x20, 0x30, 0x40],
            ..InputReport::default()
        };
        let out = transfer(&mut query, &mut pad, &input, &[CMD_READ_DATA_AND_VIBRATE, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(out[1..], [0x73, 0x5A, 0xFF, 0xFF, 0x30, 0x40, 0x10, 0x20]);
        assert_eq!(pad.analog, [0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn test_config_commands_need_config_mode() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let input = InputReport::default();
        let out = transfer(&mut query, &mut pad, &input, &[CMD_SET_MODE_AND_LOCK, 0, 1, 3]);
        assert_eq!(out[1], CONFIG_ID);
        assert_eq!(out[2..], [0, 0, 0]);
        assert_eq!(pad.mode, PadMode::Digital);
    }

    #[test]
    fn test_set_mode_and_lock() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let input = InputReport::default();
        enter_config(&mut query, &mut pad, &input);
        transfer(&mut query, &mut pad, &input, &[CMD_SET_MODE_AND_LOCK, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(pad.mode, PadMode::Analog);
        assert_eq!(pad.mode_lock, 3);

        let out = transfer(&mut query, &mut pad, &input, &[CMD_QUERY_MODEL_AND_MODE, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(out[1], CONFIG_ID);
        assert_eq!(out[2..], [0x5A, 0x03, 0x02, 0x01, 0x02, 0x01, 0x00]);

        // 設定モードを抜ける
        let out = transfer(&mut query, &mut pad, &input, &[CMD_CONFIG_MODE, 0x00, 0x00, 0, 0, 0, 0, 0]);
        assert_eq!(out[1], CONFIG_ID);
        assert_eq!(pad.config, 0);
    }

    #[test]
    fn test_vibration_mapping() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let input = InputReport::default();
        enter_config(&mut query, &mut pad, &input);
        let out = transfer(&mut query, &mut pad, &input, &[CMD_VIBRATION_TOGGLE, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(out[2..], [0x5A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(pad.vibrate_index, [3, 4]);
        transfer(&mut query, &mut pad, &input, &[CMD_CONFIG_MODE, 0x00, 0x00, 0, 0]);

        transfer(&mut query, &mut pad, &input, &[CMD_READ_DATA_AND_VIBRATE, 0x00, 0x01, 0xC0]);
        assert_eq!(pad.next_vibrate, [0xFF, 0xC0]);
    }

    #[test]
    fn test_native_mode_and_pressure() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let mut input = InputReport::default();
        input.pressure[6] = 0x80;
        enter_config(&mut query, &mut pad, &input);
        transfer(&mut query, &mut pad, &input, &[CMD_SET_DS2_NATIVE_MODE, 0x00, 0xFF, 0xFF, 0x03, 0, 0, 0]);
        assert_eq!(pad.mode, PadMode::NativeAnalog);
        transfer(&mut query, &mut pad, &input, &[CMD_CONFIG_MODE, 0x00, 0x00, 0, 0]);

        let mut bytes = vec![CMD_READ_DATA_AND_VIBRATE];
        bytes.extend([0u8; 20]);
        let out = transfer(&mut query, &mut pad, &input, &bytes);
        assert_eq!(out[1], 0x79);
        assert_eq!(out[9 + 6], 0x80);
        assert_eq!(out.len(), 22);
    }

    #[test]
    fn test_query_act_and_mode() {
        let mut query = QueryInfo::default();
        let mut pad = PadState::default();
        let input = InputReport::default();
        enter_config(&mut query, &mut pad, &input);
        let out = transfer(&mut query, &mut pad, &input, &[CMD_QUERY_ACT, 0x00, 0x01, 0, 0, 0, 0, 0]);
        assert_eq!(out[2..], QUERY_ACT[1]);
        let out = transfer(&mut query, &mut pad, &input, &[CMD_QUERY_MODE, 0x00, 0x01, 0, 0, 0, 0, 0]);
        assert_eq!(out[6], 7);
    }

    #[test]
    fn test_start_poll_bad_port() {
        let mut query = QueryInfo::default();
        assert_eq!(query.start_poll(2, 0), 0);
        assert_eq!(query, QueryInfo::default());
    }

    #[test]
    fn test_oversized_query_stays_in_bounds() {
        let mut pad = PadState::default();
        let input = InputReport::default();

        // 応答バッファより長い問い合わせ（途中まで送信済み）
        let mut query = QueryInfo {
            last_byte: 1,
            num_bytes: 200,
            query_done: 1,
            ..QueryInfo::default()
        };
        assert!(!query.is_consistent(2, 4));
        for _ in 0..255 {
            assert_eq!(query.poll(0, &mut pad, &input), 0);
        }

        // 引数バイト側も同様
        let mut query = QueryInfo {
            last_byte: 1,
            current_command: CMD_VIBRATION_TOGGLE,
            num_bytes: 200,
            query_done: 0,
            ..QueryInfo::default()
        };
        for _ in 0..255 {
            query.poll(1, &mut pad, &input);
        }
        assert!(pad.vibrate_index[1] >= 3);
    }

    #[test]
    fn test_is_consistent() {
        let mut query = QueryInfo::default();
        assert!(query.is_consistent(2, 4));
        // 設定モード外で拒否されたコマンド（応答なし）
        let mut pad = PadState::default();
        query.start_poll(0, 0);
        query.poll(CMD_QUERY_MODE, &mut pad, &InputReport::default());
        assert_eq!(query.num_bytes, 0);
        assert!(query.is_consistent(2, 4));
        query.start_poll(1, 3);
        query.poll(CMD_READ_DATA_AND_VIBRATE, &mut PadState::default(), &InputReport::default());
        assert!(query.is_consistent(2, 4));

        let mut bad = query.clone();
        bad.port = 2;
        assert!(!bad.is_consistent(2, 4));
        let mut bad = query.clone();
        bad.last_byte = bad.num_bytes;
        assert!(!bad.is_consistent(2, 4));
        let mut bad = query;
        bad.query_done = 2;
        assert!(!bad.is_consistent(2, 4));
    }
}

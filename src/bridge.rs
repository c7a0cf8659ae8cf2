//! アプリ層とのブリッジ
//!
//! アプリ（UI）から呼ばれる操作をまとめた `NativeApp`。
//! エミュレーション本体は `EmulationCore` 越しにしか触らない。
//!
//! スレッド:
//! - VMスレッド: `run_vm_thread` がコアの実行ループを回す
//! - UIスレッド: 入力・設定・サーフェス・ステート保存/読込
//!
//! ステートの保存・読込は一時停止を要求し、実行ループが
//! 安全な位置（`execute` から戻った状態）に来るまで待ってから行う。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::device::DeviceProvider;
use crate::emu_config::{
    AspectRatioType, EmuConfig, GsOptions, GsRendererType, HwMipmapLevel, LimiterModeType, TexturePreloadingLevel,
};
use crate::pad::{HostKeyEvent, PadContext, WindowInfo};
use crate::settings::{JsonSettings, SETTINGS_FILENAME};

/// サーフェスの基準サイズ（長辺がこの値で倍率1.0）
const SURFACE_BASE_SIZE: f32 = 1280.0;

/// ブリッジが持つパッド
pub type BridgePad = PadContext<Box<dyn DeviceProvider + Send>>;

/// VMの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Shutdown,
    Initializing,
    Running,
    Paused,
    Stopping,
}

/// エミュレーション本体の機能
pub trait EmulationCore: Send + Sync {
    fn has_valid_vm(&self) -> bool;
    fn state(&self) -> VmState;
    fn set_state(&self, state: VmState);
    fn set_paused(&self, paused: bool);

    fn game_crc(&self) -> u32;
    fn game_serial(&self) -> String;
    fn game_name(&self) -> String;

    fn initialize_memory(&self) -> bool;
    /// ディスクイメージ（またはBIOS）から起動
    fn initialize(&self, path: &str) -> bool;
    /// 状態が Running でなくなるまで実行
    fn execute(&self);
    fn shutdown(&self);
    fn release_memory(&self);

    fn save_state_to_slot(&self, slot: i32) -> bool;
    fn load_state_from_slot(&self, slot: i32) -> bool;
    fn has_save_state_in_slot(&self, serial: &str, crc: u32, slot: i32) -> bool;

    fn apply_gs_settings(&self, gs: &GsOptions);
    fn switch_renderer(&self, renderer: GsRendererType);
    fn set_limiter_mode(&self, mode: LimiterModeType);
    fn update_display_window(&self, window: &WindowInfo);
    fn fps(&self) -> f32;
}

/// 待ち時間の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTiming {
    /// 安全な位置を待つ回数
    pub safe_point_attempts: u32,
    pub safe_point_interval: Duration,
    /// 一時停止中の実行ループの待ち時間
    pub idle_interval: Duration,
}

impl Default for BridgeTiming {
    fn default() -> Self {
        BridgeTiming {
            safe_point_attempts: 5,
            safe_point_interval: Duration::from_secs(1),
            idle_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
struct Surface {
    handle: usize,
    width: u32,
    height: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// アプリ層から呼ばれる操作
pub struct NativeApp<C: EmulationCore> {
    core: Arc<C>,
    pad: Mutex<BridgePad>,
    config: Mutex<EmuConfig>,
    settings_path: Mutex<Option<PathBuf>>,
    surface: Mutex<Surface>,
    execute_exit: AtomicBool,
    timing: BridgeTiming,
}

impl<C: EmulationCore> NativeApp<C> {
    pub fn new(core: Arc<C>, devices: Box<dyn DeviceProvider + Send>) -> Self {
        Self::with_timing(core, devices, BridgeTiming::default())
    }

    pub fn with_timing(core: Arc<C>, devices: Box<dyn DeviceProvider + Send>, timing: BridgeTiming) -> Self {
        let mut pad = PadContext::new(devices);
        pad.init();
        NativeApp {
            core,
            pad: Mutex::new(pad),
            config: Mutex::new(EmuConfig::default()),
            settings_path: Mutex::new(None),
            surface: Mutex::new(Surface::default()),
            execute_exit: AtomicBool::new(false),
            timing,
        }
    }

    // ─── Settings ─────────────────────────────────────────────

    /// データフォルダの設定ファイルを読み込む
    pub fn initialize(&self, data_root: &Path) {
        let path = data_root.join(SETTINGS_FILENAME);
        let si = JsonSettings::load_from(&path);
        lock(&self.pad).load_config(&si);
        lock(&self.config).load(&si);
        log::info!("Settings loaded from {:?}", path);
        *lock(&self.settings_path) = Some(path);
    }

    /// 設定ファイルに書き戻す（他のキーは保持）
    pub fn save_settings(&self) -> Result<(), String> {
        let path = lock(&self.settings_path)
            .clone()
            .ok_or_else(|| "Settings path is not initialized".to_string())?;
        let mut si = JsonSettings::load_from(&path);
        lock(&self.pad).save_config(&mut si);
        lock(&self.config).save(&mut si);
        si.save_to(&path)
    }

    pub fn emu_config(&self) -> EmuConfig {
        *lock(&self.config)
    }

    /// パッドを直接操作する（freeze などコア側の呼び出し用）
    pub fn with_pad<R>(&self, f: impl FnOnce(&mut BridgePad) -> R) -> R {
        f(&mut lock(&self.pad))
    }

    // ─── Input ────────────────────────────────────────────────

    pub fn set_pad_button(&self, key: u32, range: u32, pressed: bool) {
        let event = if pressed {
            HostKeyEvent::pressed(key, range)
        } else {
            HostKeyEvent::released(key)
        };
        lock(&self.pad).handle_host_input_event(&event);
    }

    pub fn reset_key_status(&self) {
        lock(&self.pad).reset_key_status();
    }

    pub fn set_pad_vibration(&self, enabled: bool) {
        lock(&self.pad).set_vibration(enabled);
    }

    // ─── Surface ──────────────────────────────────────────────

    pub fn on_surface_created(&self) {}

    /// サーフェスの変更（handle 0 はなし）
    pub fn on_surface_changed(&self, handle: usize, width: i32, height: i32) {
        let window = {
            let mut surface = lock(&self.surface);
            surface.handle = handle;
            if width <= 0 || height <= 0 {
                return;
            }
            surface.width = width as u32;
            surface.height = height as u32;
            Self::window_of(&surface)
        };
        if self.core.has_valid_vm() {
            self.core.update_display_window(&window);
        }
    }

    pub fn on_surface_destroyed(&self) {
        lock(&self.surface).handle = 0;
    }

    pub fn window_info(&self) -> WindowInfo {
        Self::window_of(&lock(&self.surface))
    }

    fn window_of(surface: &Surface) -> WindowInfo {
        let scale = if surface.width > 0 && surface.height > 0 {
            surface.width.max(surface.height) as f32 / SURFACE_BASE_SIZE
        } else {
            1.0
        };
        WindowInfo {
            handle: surface.handle,
            surface_width: surface.width,
            surface_height: surface.height,
            surface_scale: scale,
        }
    }

    // ─── VM lifecycle ─────────────────────────────────────────

    /// VMを起動して停止要求まで実行ループを回す
    ///
    /// 起動できたら true。
    pub fn run_vm_thread(&self, path: &str) -> bool {
        self.execute_exit.store(false, Ordering::SeqCst);
        if !self.core.initialize_memory() {
            log::warn!("Failed to initialize VM memory");
            return false;
        }

        let booted = self.core.initialize(path);
        if booted {
            log::info!("VM started: {}", path);
            let window = self.window_info();
            lock(&self.pad).open(&window);
            self.core.set_state(VmState::Running);

            loop {
                match self.core.state() {
                    VmState::Stopping | VmState::Shutdown => break,
                    VmState::Running => {
                        lock(&self.pad).poll_devices();
                        self.execute_exit.store(false, Ordering::SeqCst);
                        self.core.execute();
                    }
                    _ => {
                        // 実行していないことをセーブ・ロード側へ知らせる
                        self.execute_exit.store(true, Ordering::SeqCst);
                        thread::sleep(self.timing.idle_interval);
                    }
                }
            }

            lock(&self.pad).close();
            self.core.shutdown();
            log::info!("VM stopped");
        } else {
            log::warn!("Failed to boot {}", path);
        }

        self.core.release_memory();
        booted
    }

    pub fn pause(&self) {
        self.core.set_paused(true);
    }

    pub fn resume(&self) {
        self.core.set_paused(false);
    }

    pub fn shutdown(&self) {
        self.core.set_state(VmState::Stopping);
    }

    // ─── Save states ──────────────────────────────────────────

    /// 一時停止して実行ループが止まるのを待つ
    fn pause_at_safe_point(&self) -> bool {
        self.execute_exit.store(false, Ordering::SeqCst);
        if self.core.state() != VmState::Paused {
            self.core.set_paused(true);
        }
        for _ in 0..self.timing.safe_point_attempts {
            if self.execute_exit.load(Ordering::SeqCst) {
                return true;
            }
            thread::sleep(self.timing.safe_point_interval);
        }
        log::warn!("VM did not reach a safe point");
        false
    }

    pub fn save_state_to_slot(&self, slot: i32) -> bool {
        if !self.core.has_valid_vm() || self.core.game_crc() == 0 {
            return false;
        }
        if !self.pause_at_safe_point() {
            return false;
        }
        let saved = self.core.save_state_to_slot(slot);
        log::info!("Save state to slot {}: {}", slot, if saved { "ok" } else { "failed" });
        saved
    }

    pub fn load_state_from_slot(&self, slot: i32) -> bool {
        if !self.core.has_valid_vm() {
            return false;
        }
        let crc = self.core.game_crc();
        if crc == 0 {
            return false;
        }
        let serial = self.core.game_serial();
        if !self.core.has_save_state_in_slot(&serial, crc, slot) {
            log::info!("No save state for {} in slot {}", serial, slot);
            return false;
        }
        if !self.pause_at_safe_point() {
            return false;
        }
        let loaded = self.core.load_state_from_slot(slot);
        log::info!("Load state from slot {}: {}", slot, if loaded { "ok" } else { "failed" });
        loaded
    }

    // ─── Queries ──────────────────────────────────────────────

    pub fn game_serial(&self) -> String {
        self.core.game_serial()
    }

    pub fn pause_game_title(&self) -> String {
        self.core.game_name()
    }

    /// "シリアル (CRC)" 形式
    pub fn pause_game_serial(&self) -> String {
        format!("{} ({:08X})", self.core.game_serial(), self.core.game_crc())
    }

    pub fn fps(&self) -> f32 {
        self.core.fps()
    }

    // ─── Emulator options ─────────────────────────────────────

    pub fn set_aspect_ratio(&self, value: i32) -> bool {
        let Some(ratio) = AspectRatioType::from_i32(value) else {
            log::warn!("Unknown aspect ratio {}", value);
            return false;
        };
        lock(&self.config).gs.aspect_ratio = ratio;
        true
    }

    pub fn speedhack_limiter_mode(&self, value: i32) -> bool {
        let Some(mode) = LimiterModeType::from_i32(value) else {
            log::warn!("Unknown limiter mode {}", value);
            return false;
        };
        lock(&self.config).gs.limiter_mode = mode;
        self.core.set_limiter_mode(mode);
        true
    }

    pub fn speedhack_ee_cycle_rate(&self, value: i32) {
        lock(&self.config).speedhacks.set_ee_cycle_rate(value);
    }

    pub fn speedhack_ee_cycle_skip(&self, value: i32) {
        lock(&self.config).speedhacks.set_ee_cycle_skip(value);
    }

    /// GS設定を変更し、変わっていれば実行中のVMに反映
    fn update_gs(&self, update: impl FnOnce(&mut GsOptions)) {
        let (changed, gs) = {
            let mut config = lock(&self.config);
            let before = config.gs;
            update(&mut config.gs);
            (config.gs != before, config.gs)
        };
        if changed && self.core.has_valid_vm() {
            self.core.apply_gs_settings(&gs);
        }
    }

    pub fn render_upscale_multiplier(&self, value: f32) -> bool {
        if !(value >= 1.0) {
            return false;
        }
        self.update_gs(|gs| gs.upscale_multiplier = value);
        true
    }

    pub fn render_mipmap(&self, value: i32) -> bool {
        let Some(level) = HwMipmapLevel::from_i32(value) else {
            return false;
        };
        self.update_gs(|gs| gs.hw_mipmap = level);
        true
    }

    pub fn render_half_pixel_offset(&self, value: i32) {
        self.update_gs(|gs| gs.half_pixel_offset = value);
    }

    pub fn render_preloading(&self, value: i32) -> bool {
        let Some(level) = TexturePreloadingLevel::from_i32(value) else {
            return false;
        };
        self.update_gs(|gs| gs.texture_preloading = level);
        true
    }

    /// 描画バックエンドの切り替え（実行中ならコアに切り替えを依頼）
    pub fn render_gpu(&self, value: i32) -> bool {
        let Some(renderer) = GsRendererType::from_i32(value) else {
            log::warn!("Unknown renderer {}", value);
            return false;
        };
        if self.core.has_valid_vm() {
            self.core.switch_renderer(renderer);
        }
        lock(&self.config).gs.renderer = renderer;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::VirtualButton;
    use crate::device::NullDevices;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct FakeCore {
        state: Mutex<Option<VmState>>,
        valid: AtomicBool,
        crc: AtomicU32,
        executions: AtomicU32,
        saved_slots: Mutex<Vec<i32>>,
        loaded_slots: Mutex<Vec<i32>>,
        gs_applied: AtomicU32,
        renderer: Mutex<Option<GsRendererType>>,
        window: Mutex<Option<WindowInfo>>,
        released: AtomicBool,
    }

    impl EmulationCore for FakeCore {
        fn has_valid_vm(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        fn state(&self) -> VmState {
            lock(&self.state).unwrap_or(VmState::Shutdown)
        }

        fn set_state(&self, state: VmState) {
            *lock(&self.state) = Some(state);
        }

        fn set_paused(&self, paused: bool) {
            self.set_state(if paused { VmState::Paused } else { VmState::Running });
        }

        fn game_crc(&self) -> u32 {
            self.crc.load(Ordering::SeqCst)
        }

        fn game_serial(&self) -> String {
            "SLUS-20062".to_string()
        }

        fn game_name(&self) -> String {
            "Test Game".to_string()
        }

        fn initialize_memory(&self) -> bool {
            true
        }

        fn initialize(&self, path: &str) -> bool {
            if path.is_empty() {
                return false;
            }
            self.valid.store(true, Ordering::SeqCst);
            self.crc.store(0x1234ABCD, Ordering::SeqCst);
            true
        }

        fn execute(&self) {
            self.executions.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        }

        fn shutdown(&self) {
            self.valid.store(false, Ordering::SeqCst);
            self.set_state(VmState::Shutdown);
        }

        fn release_memory(&self) {
            self.released.store(true, Ordering::SeqCst);
        }

        fn save_state_to_slot(&self, slot: i32) -> bool {
            lock(&self.saved_slots).push(slot);
            true
        }

        fn load_state_from_slot(&self, slot: i32) -> bool {
            lock(&self.loaded_slots).push(slot);
            true
        }

        fn has_save_state_in_slot(&self, _serial: &str, _crc: u32, slot: i32) -> bool {
            lock(&self.saved_slots).contains(&slot)
        }

        fn apply_gs_settings(&self, _gs: &GsOptions) {
            self.gs_applied.fetch_add(1, Ordering::SeqCst);
        }

        fn switch_renderer(&self, renderer: GsRendererType) {
            *lock(&self.renderer) = Some(renderer);
        }

        fn set_limiter_mode(&self, _mode: LimiterModeType) {}

        fn update_display_window(&self, window: &WindowInfo) {
            *lock(&self.window) = Some(*window);
        }

        fn fps(&self) -> f32 {
            59.94
        }
    }

    fn fast_timing() -> BridgeTiming {
        BridgeTiming {
            safe_point_attempts: 200,
            safe_point_interval: Duration::from_millis(5),
            idle_interval: Duration::from_millis(2),
        }
    }

    fn app() -> (Arc<FakeCore>, Arc<NativeApp<FakeCore>>) {
        let core = Arc::new(FakeCore::default());
        let app = NativeApp::with_timing(core.clone(), Box::new(NullDevices), fast_timing());
        (core, Arc::new(app))
    }

    fn wait_until(mut f: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if f() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_set_pad_button() {
        let (_core, app) = app();
        app.set_pad_button(96, 0, true);
        assert!(app.with_pad(|pad| pad.key_status().is_pressed(0, VirtualButton::Cross)));
        app.set_pad_button(96, 0, false);
        assert!(!app.with_pad(|pad| pad.key_status().is_pressed(0, VirtualButton::Cross)));
        app.set_pad_button(97, 0, true);
        app.reset_key_status();
        assert!(!app.with_pad(|pad| pad.key_status().is_pressed(0, VirtualButton::Circle)));
    }

    #[test]
    fn test_surface_scale() {
        let (core, app) = app();
        assert_eq!(app.window_info().surface_scale, 1.0);
        app.on_surface_changed(7, 1080, 2560);
        let info = app.window_info();
        assert_eq!(info.handle, 7);
        assert_eq!(info.surface_scale, 2.0);
        assert!(lock(&core.window).is_none());

        core.valid.store(true, Ordering::SeqCst);
        app.on_surface_changed(7, 640, 480);
        assert_eq!(lock(&core.window).map(|w| w.surface_scale), Some(0.5));

        app.on_surface_destroyed();
        assert!(!app.window_info().has_surface());
    }

    #[test]
    fn test_state_slots_need_vm() {
        let (_core, app) = app();
        assert!(!app.save_state_to_slot(1));
        assert!(!app.load_state_from_slot(1));
    }

    #[test]
    fn test_stale_exit_flag_is_not_a_safe_point() {
        let core = Arc::new(FakeCore::default());
        let timing = BridgeTiming {
            safe_point_attempts: 3,
            safe_point_interval: Duration::from_millis(1),
            idle_interval: Duration::from_millis(1),
        };
        let app = NativeApp::with_timing(core.clone(), Box::new(NullDevices), timing);
        core.valid.store(true, Ordering::SeqCst);
        core.crc.store(0x1234ABCD, Ordering::SeqCst);
        core.set_state(VmState::Running);

        // execute() から戻った直後の状態（実行ループはまだ一時停止を見ていない）
        app.execute_exit.store(true, Ordering::SeqCst);
        assert!(!app.save_state_to_slot(2));
        assert!(lock(&core.saved_slots).is_empty());

        lock(&core.saved_slots).push(2);
        app.execute_exit.store(true, Ordering::SeqCst);
        assert!(!app.load_state_from_slot(2));
        assert!(lock(&core.loaded_slots).is_empty());
    }

    #[test]
    fn test_run_save_load_shutdown() {
        let (core, app) = app();
        let runner = {
            let app = app.clone();
            thread::spawn(move || app.run_vm_thread("game.iso"))
        };
        wait_until(|| core.executions.load(Ordering::SeqCst) > 2);

        assert!(!app.load_state_from_slot(3));
        assert!(app.save_state_to_slot(3));
        assert_eq!(core.state(), VmState::Paused);
        assert_eq!(*lock(&core.saved_slots), vec![3]);

        assert!(app.load_state_from_slot(3));
        assert_eq!(*lock(&core.loaded_slots), vec![3]);

        app.resume();
        let resumed_at = core.executions.load(Ordering::SeqCst);
        wait_until(|| core.executions.load(Ordering::SeqCst) > resumed_at);

        app.shutdown();
        assert!(runner.join().unwrap());
        assert!(core.released.load(Ordering::SeqCst));
        assert!(!core.has_valid_vm());
    }

    #[test]
    fn test_boot_failure() {
        let (core, app) = app();
        assert!(!app.run_vm_thread(""));
        assert!(core.released.load(Ordering::SeqCst));
        assert_eq!(core.executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_gs_settings_applied_when_changed() {
        let (core, app) = app();
        assert!(app.render_upscale_multiplier(2.0));
        assert_eq!(core.gs_applied.load(Ordering::SeqCst), 0);

        core.valid.store(true, Ordering::SeqCst);
        assert!(app.render_upscale_multiplier(3.0));
        assert!(app.render_upscale_multiplier(3.0));
        assert_eq!(core.gs_applied.load(Ordering::SeqCst), 1);
        assert!(app.render_mipmap(2));
        assert!(!app.render_mipmap(7));
        assert!(!app.render_upscale_multiplier(0.5));
        assert_eq!(core.gs_applied.load(Ordering::SeqCst), 2);
        assert_eq!(app.emu_config().gs.upscale_multiplier, 3.0);
    }

    #[test]
    fn test_renderer_switch() {
        let (core, app) = app();
        assert!(app.render_gpu(12));
        assert!(lock(&core.renderer).is_none());
        core.valid.store(true, Ordering::SeqCst);
        assert!(app.render_gpu(14));
        assert_eq!(*lock(&core.renderer), Some(GsRendererType::Vulkan));
        assert_eq!(app.emu_config().gs.renderer, GsRendererType::Vulkan);
        assert!(!app.render_gpu(42));
    }

    #[test]
    fn test_speedhack_setters() {
        let (_core, app) = app();
        app.speedhack_ee_cycle_rate(5);
        app.speedhack_ee_cycle_skip(2);
        assert!(app.set_aspect_ratio(2));
        assert!(!app.set_aspect_ratio(9));
        assert!(app.speedhack_limiter_mode(1));
        let config = app.emu_config();
        assert_eq!(config.speedhacks.ee_cycle_rate, 3);
        assert_eq!(config.speedhacks.ee_cycle_skip, 2);
        assert_eq!(config.gs.aspect_ratio, AspectRatioType::Ratio16x9);
        assert_eq!(config.gs.limiter_mode, LimiterModeType::Turbo);
    }

    #[test]
    fn test_settings_file() {
        let (_core, app) = app();
        assert!(app.save_settings().is_err());

        let dir = std::env::temp_dir().join(format!("ps2pad_bridge_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        app.initialize(&dir);
        app.speedhack_ee_cycle_skip(1);
        app.with_pad(|pad| pad.config_mut().set_joy_uid(0, 99));
        app.save_settings().unwrap();

        let (_core2, other) = self::app();
        other.initialize(&dir);
        assert_eq!(other.emu_config().speedhacks.ee_cycle_skip, 1);
        assert_eq!(other.with_pad(|pad| pad.config().joy_uid(0)), 99);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_queries() {
        let (core, app) = app();
        core.crc.store(0xABCD, Ordering::SeqCst);
        assert_eq!(app.pause_game_serial(), "SLUS-20062 (0000ABCD)");
        assert_eq!(app.pause_game_title(), "Test Game");
        assert_eq!(app.game_serial(), "SLUS-20062");
        assert_eq!(app.fps(), 59.94);
    }
}

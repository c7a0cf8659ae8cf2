//! エミュレータ本体の設定（スピードハック・ゲーム修正・GS）
//!
//! 値はエミュレーションコアにそのまま渡すだけで、ここでは解釈しない。
//! 読み込みと保存はキー一覧を1か所に書くため `SettingsWrapper` で共通化。

use serde::{Deserialize, Serialize};

use crate::settings::SettingsInterface;

/// 読み込み・保存の向きを持つラッパー
pub enum SettingsWrapper<'a> {
    Load(&'a dyn SettingsInterface),
    Save(&'a mut dyn SettingsInterface),
}

impl SettingsWrapper<'_> {
    pub fn is_loading(&self) -> bool {
        matches!(self, SettingsWrapper::Load(_))
    }

    pub fn entry_bool(&mut self, section: &str, key: &str, value: &mut bool) {
        match self {
            SettingsWrapper::Load(si) => *value = si.get_bool(section, key, *value),
            SettingsWrapper::Save(si) => si.set_bool(section, key, *value),
        }
    }

    pub fn entry_int(&mut self, section: &str, key: &str, value: &mut i32) {
        match self {
            SettingsWrapper::Load(si) => *value = si.get_int(section, key, *value),
            SettingsWrapper::Save(si) => si.set_int(section, key, *value),
        }
    }

    pub fn entry_float(&mut self, section: &str, key: &str, value: &mut f32) {
        match self {
            SettingsWrapper::Load(si) => *value = si.get_float(section, key, *value),
            SettingsWrapper::Save(si) => si.set_float(section, key, *value),
        }
    }
}

/// 数値で受け渡しする列挙型
macro_rules! int_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn to_i32(self) -> i32 {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }
    };
}

int_enum! {
    /// 描画バックエンド
    GsRendererType { Auto = -1, Dx11 = 3, Null = 11, OpenGl = 12, Software = 13, Vulkan = 14 }
}

int_enum! {
    /// アスペクト比
    AspectRatioType { Stretch = 0, Ratio4x3 = 1, Ratio16x9 = 2 }
}

int_enum! {
    /// フレームリミッタ
    LimiterModeType { Nominal = 0, Turbo = 1, Slomo = 2, Unlimited = 3 }
}

int_enum! {
    /// ハードウェアミップマップ
    HwMipmapLevel { Automatic = -1, Off = 0, Basic = 1, Full = 2 }
}

int_enum! {
    /// テクスチャ事前読み込み
    TexturePreloadingLevel { Off = 0, Partial = 1, Full = 2 }
}

impl GsRendererType {
    pub fn name(self) -> &'static str {
        match self {
            GsRendererType::Auto => "Auto",
            GsRendererType::Dx11 => "Direct3D 11",
            GsRendererType::OpenGl => "OpenGL",
            GsRendererType::Vulkan => "Vulkan",
            GsRendererType::Software => "Software",
            GsRendererType::Null => "Null",
        }
    }
}

/// 列挙型の項目を整数として読み書き（未知の値は無視）
fn wrap_enum<T: Copy>(
    wrap: &mut SettingsWrapper,
    section: &str,
    key: &str,
    value: &mut T,
    to_i32: fn(T) -> i32,
    from_i32: fn(i32) -> Option<T>,
) {
    let mut raw = to_i32(*value);
    wrap.entry_int(section, key, &mut raw);
    if let Some(v) = from_i32(raw) {
        *value = v;
    }
}

/// スピードハック
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedhackOptions {
    /// -3..=3
    pub ee_cycle_rate: i32,
    /// 0..=3
    pub ee_cycle_skip: i32,
    pub fast_cdvd: bool,
    pub intc_stat: bool,
    pub wait_loop: bool,
    pub vu_flag_hack: bool,
    pub vu_thread: bool,
    pub vu1_instant: bool,
}

impl Default for SpeedhackOptions {
    fn default() -> Self {
        // 推奨のハックは有効
        SpeedhackOptions {
            ee_cycle_rate: 0,
            ee_cycle_skip: 0,
            fast_cdvd: false,
            intc_stat: true,
            wait_loop: true,
            vu_flag_hack: true,
            vu_thread: true,
            vu1_instant: true,
        }
    }
}

impl SpeedhackOptions {
    const SECTION: &'static str = "EmuCore/Speedhacks";

    pub fn disable_all(&mut self) {
        *self = SpeedhackOptions {
            ee_cycle_rate: 0,
            ee_cycle_skip: 0,
            fast_cdvd: false,
            intc_stat: false,
            wait_loop: false,
            vu_flag_hack: false,
            vu_thread: false,
            vu1_instant: false,
        };
    }

    pub fn set_ee_cycle_rate(&mut self, value: i32) {
        self.ee_cycle_rate = value.clamp(-3, 3);
    }

    pub fn set_ee_cycle_skip(&mut self, value: i32) {
        self.ee_cycle_skip = value.clamp(0, 3);
    }

    pub fn load_save(&mut self, wrap: &mut SettingsWrapper) {
        let s = Self::SECTION;
        wrap.entry_int(s, "EECycleRate", &mut self.ee_cycle_rate);
        wrap.entry_int(s, "EECycleSkip", &mut self.ee_cycle_skip);
        wrap.entry_bool(s, "fastCDVD", &mut self.fast_cdvd);
        wrap.entry_bool(s, "IntcStat", &mut self.intc_stat);
        wrap.entry_bool(s, "WaitLoop", &mut self.wait_loop);
        wrap.entry_bool(s, "vuFlagHack", &mut self.vu_flag_hack);
        wrap.entry_bool(s, "vuThread", &mut self.vu_thread);
        wrap.entry_bool(s, "vu1Instant", &mut self.vu1_instant);
        if wrap.is_loading() {
            self.set_ee_cycle_rate(self.ee_cycle_rate);
            self.set_ee_cycle_skip(self.ee_cycle_skip);
        }
    }
}

/// ゲーム個別の修正（既定はすべて無効）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamefixOptions {
    pub vu_add_sub_hack: bool,
    pub fpu_mul_hack: bool,
    pub fpu_neg_div_hack: bool,
    pub xg_kick_hack: bool,
    pub ee_timing_hack: bool,
    pub skip_mpeg_hack: bool,
    pub oph_flag_hack: bool,
    pub dma_busy_hack: bool,
    pub vif_fifo_hack: bool,
    pub vif1_stall_hack: bool,
    pub gif_fifo_hack: bool,
    pub goemon_tlb_hack: bool,
    pub ibit_hack: bool,
    pub vu_kickstart_hack: bool,
    pub vu_overflow_hack: bool,
}

impl GamefixOptions {
    const SECTION: &'static str = "EmuCore/Gamefixes";

    pub fn disable_all(&mut self) {
        *self = GamefixOptions::default();
    }

    fn entries(&mut self) -> [(&'static str, &mut bool); 15] {
        [
            ("VuAddSubHack", &mut self.vu_add_sub_hack),
            ("FpuMulHack", &mut self.fpu_mul_hack),
            ("FpuNegDivHack", &mut self.fpu_neg_div_hack),
            ("XgKickHack", &mut self.xg_kick_hack),
            ("EETimingHack", &mut self.ee_timing_hack),
            ("SkipMPEGHack", &mut self.skip_mpeg_hack),
            ("OPHFlagHack", &mut self.oph_flag_hack),
            ("DMABusyHack", &mut self.dma_busy_hack),
            ("VIFFIFOHack", &mut self.vif_fifo_hack),
            ("VIF1StallHack", &mut self.vif1_stall_hack),
            ("GIFFIFOHack", &mut self.gif_fifo_hack),
            ("GoemonTlbHack", &mut self.goemon_tlb_hack),
            ("IbitHack", &mut self.ibit_hack),
            ("VUKickstartHack", &mut self.vu_kickstart_hack),
            ("VUOverflowHack", &mut self.vu_overflow_hack),
        ]
    }

    /// 名前で有効・無効を切り替える（未知の名前は false を返す）
    pub fn set_by_name(&mut self, name: &str, enabled: bool) -> bool {
        for (key, value) in self.entries() {
            if key.eq_ignore_ascii_case(name) {
                *value = enabled;
                return true;
            }
        }
        false
    }

    pub fn load_save(&mut self, wrap: &mut SettingsWrapper) {
        for (key, value) in self.entries() {
            wrap.entry_bool(Self::SECTION, key, value);
        }
    }
}

/// GS（描画）設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GsOptions {
    pub renderer: GsRendererType,
    pub aspect_ratio: AspectRatioType,
    pub upscale_multiplier: f32,
    pub hw_mipmap: HwMipmapLevel,
    pub half_pixel_offset: i32,
    pub texture_preloading: TexturePreloadingLevel,
    pub frame_limit_enable: bool,
    pub limiter_mode: LimiterModeType,
}

impl Default for GsOptions {
    fn default() -> Self {
        GsOptions {
            renderer: GsRendererType::Auto,
            aspect_ratio: AspectRatioType::Ratio4x3,
            upscale_multiplier: 1.0,
            hw_mipmap: HwMipmapLevel::Automatic,
            half_pixel_offset: 0,
            texture_preloading: TexturePreloadingLevel::Off,
            frame_limit_enable: true,
            limiter_mode: LimiterModeType::Nominal,
        }
    }
}

impl GsOptions {
    const SECTION: &'static str = "EmuCore/GS";

    /// アスペクト比から横/縦の比率（Stretchは None）
    pub fn aspect_ratio_float(&self) -> Option<f32> {
        match self.aspect_ratio {
            AspectRatioType::Stretch => None,
            AspectRatioType::Ratio4x3 => Some(4.0 / 3.0),
            AspectRatioType::Ratio16x9 => Some(16.0 / 9.0),
        }
    }

    pub fn use_hardware_renderer(&self) -> bool {
        !matches!(self.renderer, GsRendererType::Software | GsRendererType::Null)
    }

    pub fn load_save(&mut self, wrap: &mut SettingsWrapper) {
        let s = Self::SECTION;
        wrap_enum(wrap, s, "Renderer", &mut self.renderer, GsRendererType::to_i32, GsRendererType::from_i32);
        wrap_enum(wrap, s, "AspectRatio", &mut self.aspect_ratio, AspectRatioType::to_i32, AspectRatioType::from_i32);
        wrap.entry_float(s, "upscale_multiplier", &mut self.upscale_multiplier);
        wrap_enum(wrap, s, "mipmap_hw", &mut self.hw_mipmap, HwMipmapLevel::to_i32, HwMipmapLevel::from_i32);
        wrap.entry_int(s, "UserHacks_HalfPixelOffset", &mut self.half_pixel_offset);
        wrap_enum(
            wrap,
            s,
            "texture_preloading",
            &mut self.texture_preloading,
            TexturePreloadingLevel::to_i32,
            TexturePreloadingLevel::from_i32,
        );
        wrap.entry_bool(s, "FrameLimitEnable", &mut self.frame_limit_enable);
        wrap_enum(wrap, s, "LimiterMode", &mut self.limiter_mode, LimiterModeType::to_i32, LimiterModeType::from_i32);
        if wrap.is_loading() && !(self.upscale_multiplier >= 1.0) {
            self.upscale_multiplier = 1.0;
        }
    }
}

/// エミュレータ設定全体
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmuConfig {
    pub speedhacks: SpeedhackOptions,
    pub gamefixes: GamefixOptions,
    pub gs: GsOptions,
}

impl EmuConfig {
    pub fn load(&mut self, si: &dyn SettingsInterface) {
        self.load_save(&mut SettingsWrapper::Load(si));
    }

    pub fn save(&mut self, si: &mut dyn SettingsInterface) {
        self.load_save(&mut SettingsWrapper::Save(si));
    }

    fn load_save(&mut self, wrap: &mut SettingsWrapper) {
        self.speedhacks.load_save(wrap);
        self.gamefixes.load_save(wrap);
        self.gs.load_save(wrap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::JsonSettings;

    #[test]
    fn test_defaults() {
        let config = EmuConfig::default();
        assert!(config.speedhacks.wait_loop);
        assert!(!config.speedhacks.fast_cdvd);
        assert!(!config.gamefixes.ee_timing_hack);
        assert_eq!(config.gs.renderer, GsRendererType::Auto);
        assert!(config.gs.use_hardware_renderer());
    }

    #[test]
    fn test_save_then_load() {
        let mut config = EmuConfig::default();
        config.speedhacks.set_ee_cycle_rate(-2);
        config.gamefixes.set_by_name("eetiminghack", true);
        config.gs.renderer = GsRendererType::Vulkan;
        config.gs.aspect_ratio = AspectRatioType::Ratio16x9;
        config.gs.upscale_multiplier = 3.0;

        let mut si = JsonSettings::new();
        config.save(&mut si);
        assert_eq!(si.get_int("EmuCore/GS", "Renderer", 0), 14);
        assert!(si.get_bool("EmuCore/Gamefixes", "EETimingHack", false));

        let mut loaded = EmuConfig::default();
        loaded.load(&si);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_sanitizes() {
        let mut si = JsonSettings::new();
        si.set_int("EmuCore/Speedhacks", "EECycleRate", 9);
        si.set_int("EmuCore/GS", "Renderer", 99);
        si.set_float("EmuCore/GS", "upscale_multiplier", 0.0);
        let mut config = EmuConfig::default();
        config.load(&si);
        assert_eq!(config.speedhacks.ee_cycle_rate, 3);
        assert_eq!(config.gs.renderer, GsRendererType::Auto);
        assert_eq!(config.gs.upscale_multiplier, 1.0);
    }

    #[test]
    fn test_gamefix_names() {
        let mut fixes = GamefixOptions::default();
        assert!(fixes.set_by_name("XgKickHack", true));
        assert!(fixes.xg_kick_hack);
        assert!(!fixes.set_by_name("IpuWait", true));
        fixes.disable_all();
        assert_eq!(fixes, GamefixOptions::default());
    }

    #[test]
    fn test_enum_conversion() {
        assert_eq!(GsRendererType::from_i32(12), Some(GsRendererType::OpenGl));
        assert_eq!(GsRendererType::OpenGl.name(), "OpenGL");
        assert_eq!(HwMipmapLevel::from_i32(-1), Some(HwMipmapLevel::Automatic));
        assert_eq!(LimiterModeType::from_i32(4), None);
    }
}

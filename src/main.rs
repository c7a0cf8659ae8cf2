//! PS2Pad - コントローラ設定とセーブステートの確認ツール
//!
//! # 使用方法
//! ```text
//! ps2pad defaults
//! ps2pad bindings --pad 1
//! ps2pad inspect pad.freeze
//! ps2pad blank pad.freeze
//! ps2pad devices
//! ```

use std::fs;
use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::json;

use ps2pad::device;
use ps2pad::freeze::{FreezeAction, FrozenMode, PadFullFreezeData, FREEZE_SIZE};
use ps2pad::key_status::MAX_PADS;
use ps2pad::pad::{PadContext, WindowInfo};
use ps2pad::settings::{JsonSettings, SETTINGS_FILENAME};

#[derive(Parser, Debug)]
#[command(name = "ps2pad")]
#[command(author = "PS2Pad Project")]
#[command(version = "0.3.0")]
#[command(about = "PS2Pad - PlayStation 2 controller subsystem tools", long_about = None)]
struct Args {
    /// 設定ファイル
    #[arg(short, long, default_value = SETTINGS_FILENAME)]
    settings: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 既定の設定を書き込む
    Defaults,

    /// 有効なキー割り当てを表示
    Bindings {
        /// パッド番号（省略時は全パッド）
        #[arg(short, long)]
        pad: Option<usize>,
    },

    /// freezeブロックの内容を表示
    Inspect {
        blob: String,
    },

    /// 初期状態のfreezeブロックを書き出す
    Blank {
        out: String,
    },

    /// 接続中のゲームパッドを表示
    Devices,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let result = match args.command {
        Command::Defaults => write_defaults(&args.settings),
        Command::Bindings { pad } => print_bindings(&args.settings, pad),
        Command::Inspect { blob } => inspect(&blob),
        Command::Blank { out } => write_blank(&out),
        Command::Devices => {
            list_devices();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn write_defaults(path: &str) -> Result<(), String> {
    let mut si = JsonSettings::load_from(path);
    let mut ctx = PadContext::new(device::NullDevices);
    ctx.set_default_config(&mut si);
    si.save_to(path)?;
    let sections: Vec<&str> = si.sections().collect();
    println!("Default settings written to {} ({})", path, sections.join(", "));
    Ok(())
}

fn print_bindings(path: &str, pad: Option<usize>) -> Result<(), String> {
    if !Path::new(path).exists() {
        log::info!("{} not found, showing defaults", path);
    }
    let si = JsonSettings::load_from(path);
    let mut ctx = PadContext::new(device::NullDevices);
    ctx.load_config(&si);

    let pads: Vec<usize> = match pad {
        Some(p) if p >= MAX_PADS => return Err(format!("Pad must be 0..{}", MAX_PADS - 1)),
        Some(p) => vec![p],
        None => (0..MAX_PADS).collect(),
    };

    for pad in pads {
        let list = ctx.bindings().bindings(pad);
        if list.is_empty() {
            continue;
        }
        println!("Pad {}:", pad);
        for (code, button) in list {
            println!("  {:<16} {}", button.name(), code);
        }
    }
    Ok(())
}

fn inspect(blob: &str) -> Result<(), String> {
    let data = fs::read(blob).map_err(|e| format!("Failed to read {}: {}", blob, e))?;
    let frozen = PadFullFreezeData::decode(&data).map_err(|e| e.to_string())?;

    let ports: Vec<_> = frozen
        .pads
        .iter()
        .enumerate()
        .map(|(port, slots)| {
            let slots: Vec<_> = slots
                .iter()
                .map(|pad| {
                    let mode = match pad.mode {
                        FrozenMode::Known(mode) => format!("{:?}", mode),
                        FrozenMode::Unknown(raw) => format!("Unknown({:#04x})", raw),
                    };
                    json!({
                        "mode": mode,
                        "config": pad.config,
                        "mode_lock": pad.mode_lock,
                        "analog": pad.analog,
                        "vibrate_index": pad.vibrate_index,
                    })
                })
                .collect();
            json!({ "port": port, "active_slot": frozen.slots[port], "slots": slots })
        })
        .collect();

    let summary = json!({
        "format": String::from_utf8_lossy(&frozen.format).trim_end_matches('\0'),
        "version": format!("{:#06x}", frozen.version),
        "query": {
            "port": frozen.query.port,
            "slot": frozen.query.slot,
            "command": frozen.query.current_command,
            "done": frozen.query.query_done != 0,
        },
        "ports": ports,
    });
    let text = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn write_blank(out: &str) -> Result<(), String> {
    let mut ctx = PadContext::new(device::NullDevices);
    ctx.init();
    let mut buffer = vec![0u8; FREEZE_SIZE];
    ctx.freeze(FreezeAction::Save, &mut buffer).map_err(|e| e.to_string())?;
    fs::write(out, &buffer).map_err(|e| format!("Failed to write {}: {}", out, e))?;
    println!("Wrote {} bytes to {}", buffer.len(), out);
    Ok(())
}

fn list_devices() {
    let mut ctx = PadContext::new(device::default_provider());
    ctx.open(&WindowInfo::default());
    if ctx.devices().is_empty() {
        println!("No gamepad detected");
        return;
    }
    for info in ctx.devices() {
        let pad = (0..MAX_PADS).find(|&p| ctx.assigned_device(p) == Some(info.id));
        println!(
            "{:>3}  uid {:#010x}  ff {:<5}  pad {}  {}",
            info.id.0,
            info.uid,
            info.supports_force_feedback,
            pad.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            info.name
        );
    }
}

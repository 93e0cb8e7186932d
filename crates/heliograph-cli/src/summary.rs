use std::path::Path;

use console::Style;
use heliograph_core::pipeline::config::{AutocropSize, ScanConfig, ScanMode};

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn mode_label(mode: &ScanMode) -> String {
    match mode {
        ScanMode::LineCenter { pixel_shift } => {
            if *pixel_shift == 0.0 {
                "line center".into()
            } else {
                format!("line center, shift {:+.1}", pixel_shift)
            }
        }
        ScanMode::DopplerContinuum {
            doppler_shift,
            continuum_shift,
            continuum_only,
            ..
        } => {
            if *continuum_only {
                format!("continuum at {:+.1}", continuum_shift)
            } else {
                format!(
                    "doppler +/-{:.1}, continuum {:+.1}",
                    doppler_shift, continuum_shift
                )
            }
        }
        ScanMode::VolumeScan { half_range } => {
            format!("volume scan, {} channels", 2 * half_range + 1)
        }
        ScanMode::Polarization { offset, .. } => format!("polarization +/-{:.1}", offset),
        ScanMode::WeakLine { shift1, shift2, .. } => {
            format!("weak line, shifts {:+.1} {:+.1}", shift1, shift2)
        }
    }
}

pub fn print_scan_summary(input: &Path, config: &ScanConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Heliograph Reconstruction"));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Mode"),
        s.method.apply_to(mode_label(&config.mode))
    );

    match config.autocrop {
        Some(AutocropSize::Fixed(size)) => println!(
            "  {:<14}{}",
            s.label.apply_to("Crop"),
            s.value.apply_to(format!("{0}x{0}", size))
        ),
        Some(AutocropSize::FromRadius) => println!(
            "  {:<14}{}",
            s.label.apply_to("Crop"),
            s.value.apply_to("from disk radius")
        ),
        None => {}
    }

    if config.noise_reduction {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Noise"),
            s.method.apply_to("3-column triplets")
        );
    }
    if config.flip_horizontal || config.flip_vertical {
        let mut flips = Vec::new();
        if config.flip_horizontal {
            flips.push("E-W");
        }
        if config.flip_vertical {
            flips.push("N-S");
        }
        println!(
            "  {:<14}{}",
            s.label.apply_to("Flip"),
            s.value.apply_to(flips.join(", "))
        );
    }
    if let Some(tilt) = config.forced_tilt_deg {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Tilt"),
            s.disabled.apply_to(format!("forced {:+.2} deg", tilt))
        );
    }
    if let Some(ratio) = config.forced_ratio {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Ratio"),
            s.disabled.apply_to(format!("forced {:.3}", ratio))
        );
    }
    if config.position_angle_deg != 0.0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("P angle"),
            s.value.apply_to(format!("{:+.2} deg", config.position_angle_deg))
        );
    }
    println!();
}

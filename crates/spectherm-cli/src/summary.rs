use std::path::Path;

use console::Style;
use spectherm_core::frame::SpectralShape;
use spectherm_core::sweep::{PlanckMap, PointStatus, TwoColorPoint, WavelengthWindow};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

fn print_window(s: &Styles, window: &WavelengthWindow) {
    println!(
        "  {:<14}{}",
        s.label.apply_to("Window"),
        s.value.apply_to(format!("{} - {} nm", window.lower, window.upper))
    );
}

pub fn print_max_intensity_summary(input: &Path, output: &Path, shape: SpectralShape, peak: f64) {
    let s = Styles::new();
    print_title(&s, "Max Intensity");

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Grid"),
        s.value.apply_to(format!("{} x {}", shape.frame_num, shape.position_pixel_num))
    );
    println!("  {:<14}{}", s.label.apply_to("Peak"), s.value.apply_to(peak));
    println!();
}

pub fn print_planck_summary(input: &Path, output: &Path, window: &WavelengthWindow, map: &PlanckMap) {
    let s = Styles::new();
    print_title(&s, "Planck Fit");

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    print_window(&s, window);
    println!();

    println!("  {}", s.header.apply_to("Points"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Fitted"),
        s.value.apply_to(map.count(PointStatus::Fitted))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Warned"),
        s.value.apply_to(map.count(PointStatus::Warned))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Failed"),
        s.warning.apply_to(map.count(PointStatus::Failed))
    );

    let fitted: Vec<f64> = map
        .temperature
        .iter()
        .zip(map.status.iter())
        .filter(|(_, st)| st.is_valid())
        .map(|(t, _)| *t)
        .collect();
    if !fitted.is_empty() {
        let min = fitted.iter().copied().fold(f64::INFINITY, f64::min);
        let max = fitted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!(
            "    {:<12}{}",
            s.label.apply_to("Range"),
            s.value.apply_to(format!("{min:.1} - {max:.1} K"))
        );
    }
    for failure in map.failures.iter().take(5) {
        println!(
            "    {}",
            s.warning.apply_to(format!(
                "({}, {}): {}",
                failure.frame, failure.position, failure.message
            ))
        );
    }
    println!();
}

pub fn print_two_color_summary(input: &Path, window: &WavelengthWindow, point: &TwoColorPoint) {
    let s = Styles::new();
    print_title(&s, "Two-Color Pyrometry");

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Point"),
        s.value.apply_to(format!("frame {}, position {}", point.frame, point.position))
    );
    print_window(&s, window);
    println!();

    let solution = &point.solution;
    println!("  {}", s.header.apply_to("Pairs"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Total"),
        s.value.apply_to(solution.pair_count())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Solved"),
        s.value.apply_to(solution.temperatures.len())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Warned"),
        s.warning.apply_to(solution.warned.len())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Failed"),
        s.warning.apply_to(solution.failed.len())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Plausible"),
        s.value.apply_to(point.plausible.len())
    );
    println!();

    println!("  {}", s.header.apply_to("Histogram Fit"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Model"),
        s.value.apply_to(point.fit.model)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Bins"),
        s.value.apply_to(point.fitter.bins())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Center"),
        s.value.apply_to(format!("{:.1} \u{00b1} {:.1} K", point.fit.center, point.fit.center_error))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Width"),
        s.value.apply_to(format!(
            "{:.1} K ({:.2}%)",
            point.fit.width,
            point.fit.relative_width_percent()
        ))
    );
    if let Some(eta) = point.fit.mixing_ratio {
        println!("    {:<12}{}", s.label.apply_to("Mixing"), s.value.apply_to(format!("{eta:.3}")));
    }
    println!();
}

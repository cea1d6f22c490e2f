use console::Style;
use lightsheet_core::channels::ChannelMap;
use lightsheet_core::config::PipelineConfig;
use lightsheet_core::pipeline::RunReport;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    ok: Style,
    failed: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            ok: Style::new().green(),
            failed: Style::new().red().bold(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_header(config: &PipelineConfig, dry_run: bool) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Lightsheet Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(19)));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Root"),
        s.path.apply_to(config.root.display())
    );
    let stages: Vec<String> = config.enabled_stages().iter().map(|k| k.to_string()).collect();
    if stages.is_empty() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Stages"),
            s.disabled.apply_to("none")
        );
    } else {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Stages"),
            s.value.apply_to(stages.join(" \u{2192} "))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Pixel size"),
        s.value.apply_to(format!("{} \u{b5}m", config.xy_res))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Submit"),
        s.value.apply_to(config.scheduler.submit_prefix())
    );
    if dry_run {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Mode"),
            s.disabled.apply_to("dry run")
        );
    }
    println!();
}

pub fn print_run_report(report: &RunReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Acquisitions"));
    for acq in &report.processed {
        println!(
            "    {} {}  {}",
            s.ok.apply_to("\u{2713}"),
            s.path.apply_to(acq.dir.display()),
            s.label
                .apply_to(format!("{} file(s), {} job(s)", acq.files, acq.commands.len()))
        );
    }
    for dir in &report.empty {
        println!(
            "    {} {}  {}",
            s.disabled.apply_to("-"),
            s.path.apply_to(dir.display()),
            s.disabled.apply_to("no image files")
        );
    }
    for (dir, err) in &report.failed {
        println!(
            "    {} {}  {}",
            s.failed.apply_to("\u{2717}"),
            s.path.apply_to(dir.display()),
            s.failed.apply_to(err)
        );
    }
    println!();
    let verb = if report.dry_run { "planned" } else { "submitted" };
    println!(
        "  {:<14}{}",
        s.label.apply_to("Jobs"),
        s.value.apply_to(format!("{} {verb}", report.job_count()))
    );
    println!();
}

pub fn print_channel_map(map: &ChannelMap) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Channels"));
    println!(
        "    {:<12}{:<8}{:<10}{}",
        s.label.apply_to("token"),
        s.label.apply_to("slot"),
        s.label.apply_to("laser"),
        s.label.apply_to("output")
    );
    for b in map.bindings() {
        println!(
            "    {:<12}{:<8}{:<10}{}",
            s.value.apply_to(b.token),
            b.slot,
            format!("{} nm", b.laser),
            s.ok.apply_to(format!("ch{}", b.output_channel))
        );
    }
    if map.camera_offset() > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("B offset"),
            map.camera_offset()
        );
    }
    if !map.tiles().is_empty() {
        println!("  {}", s.header.apply_to("Tiles"));
        for (token, n) in map.tiles() {
            println!("    {:<24}{}", token, s.value.apply_to(format!("tile{n}")));
        }
    }
    println!();
}

use anyhow::{Context, Result};
use clap::Parser;
use ggbuild::preprocessor::{expand_variables, parse_definitions};
use ggbuild::{parse_plot_spec, render_plot, OutputFormat, RenderOptions, RowTable};
use std::io::{self, Read, Write};

#[derive(Parser, Debug)]
#[command(name = "ggbuild")]
#[command(about = "Render grammar-of-graphics plots from CSV or JSON data", long_about = None)]
struct Args {
    /// Plot DSL (e.g., 'aes(x: displ, y: hwy, colour: class) | point() | smooth(method: "lm")')
    dsl: String,

    /// Variable definition for `$name` references in the DSL (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Render options as JSON, e.g. '{"width": 1024, "type": "svg"}'
    #[arg(long)]
    options: Option<String>,

    /// Output width in pixels (overrides --options)
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels (overrides --options)
    #[arg(long)]
    height: Option<u32>,

    /// Output format (overrides --options)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Read stdin as a JSON array of objects instead of CSV
    #[arg(long)]
    json: bool,
}

fn read_data(json: bool) -> Result<RowTable> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read data from stdin")?;
    if json {
        let value: serde_json::Value = serde_json::from_str(&input).context("Failed to parse JSON input")?;
        RowTable::from_json(&value).context("Invalid JSON data")
    } else {
        RowTable::from_csv(input.as_bytes()).context("Failed to read CSV from stdin")
    }
}

fn render_options(args: &Args) -> Result<RenderOptions> {
    let mut options = match &args.options {
        Some(json) => serde_json::from_str(json).context("Failed to parse --options")?,
        None => RenderOptions::default(),
    };
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(height) = args.height {
        options.height = height;
    }
    if let Some(format) = args.format {
        options.format = format;
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let options = render_options(&args)?;
    let variables = parse_definitions(args.vars.iter().map(String::as_str)).context("Invalid --var")?;
    let dsl = expand_variables(&args.dsl, &variables).context("Failed to expand variables")?;

    let data = read_data(args.json)?;

    let plot_spec = match parse_plot_spec(&dsl) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            std::process::exit(1);
        }
    };

    let rendered = render_plot(&plot_spec, &data, &options).context("Failed to render plot")?;
    for diagnostic in &rendered.diagnostics {
        eprintln!("Warning: {}", diagnostic);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(&rendered.bytes)
        .context("Failed to write output to stdout")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}

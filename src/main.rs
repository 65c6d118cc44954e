//! Spectaculum demo - apply an effect chain to an image
//!
//! Usage:
//!   spectaculum-demo [--settings <file.xml>] <input image> <output.png> [effect[:Name=value,...]]...
//!   spectaculum-demo --list
//!
//! Example:
//!   spectaculum-demo photo.jpg out.png flip:Mode=0 contrast_brightness:Contrast=1.4

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use serde::Serialize;

use spectaculum::effects::{Parameter, ParameterKind, ParameterValue};
use spectaculum::telemetry::init_logging;
use spectaculum::{EffectRegistry, ParameterInfo, PipelineSettings, RenderThread};

type DemoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Effect description printed by `--list`
#[derive(Serialize)]
struct EffectListing {
    effect_type: &'static str,
    name: &'static str,
    category: &'static str,
    description: &'static str,
    parameters: Vec<ParameterInfo>,
}

/// One effect requested on the command line
#[derive(Debug, PartialEq)]
struct EffectRequest {
    effect_type: String,
    assignments: Vec<(String, String)>,
}

fn parse_effect_request(arg: &str) -> DemoResult<EffectRequest> {
    let (effect_type, rest) = match arg.split_once(':') {
        Some((effect_type, rest)) => (effect_type, rest),
        None => (arg, ""),
    };

    let mut assignments = Vec::new();
    for assignment in rest.split(',').filter(|s| !s.trim().is_empty()) {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("expected Name=value in '{}'", assignment))?;
        assignments.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(EffectRequest {
        effect_type: effect_type.trim().to_string(),
        assignments,
    })
}

/// Parse `text` according to the parameter's type and set it
fn assign(parameter: &Parameter, text: &str) -> DemoResult<ParameterValue> {
    let stored = match parameter.kind() {
        ParameterKind::Float => parameter.set_float(text.parse()?)?,
        ParameterKind::Int => parameter.set_int(text.parse()?)?,
        ParameterKind::Bool => parameter.set_bool(text.parse()?)?,
        ParameterKind::Choice => match text.parse::<usize>() {
            Ok(index) => parameter.set_choice(index)?,
            Err(_) => parameter.set_choice_label(text)?,
        },
    };
    Ok(stored)
}

fn list_effects(registry: &EffectRegistry) -> DemoResult<()> {
    let listings: Vec<EffectListing> = registry
        .effects()
        .map(|def| EffectListing {
            effect_type: def.effect_type(),
            name: def.display_name(),
            category: def.category(),
            description: def.description(),
            parameters: def.create().parameters().infos(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listings)?);
    Ok(())
}

struct Args {
    settings: Option<PathBuf>,
    list: bool,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    effects: Vec<String>,
}

fn parse_args(args: &[String]) -> DemoResult<Args> {
    let mut parsed = Args {
        settings: None,
        list: false,
        input: None,
        output: None,
        effects: Vec::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list" => parsed.list = true,
            "--settings" => {
                let path = iter.next().ok_or("--settings needs a file")?;
                parsed.settings = Some(PathBuf::from(path));
            }
            _ if parsed.input.is_none() => parsed.input = Some(PathBuf::from(arg)),
            _ if parsed.output.is_none() => parsed.output = Some(PathBuf::from(arg)),
            _ => parsed.effects.push(arg.clone()),
        }
    }
    Ok(parsed)
}

fn run(args: Args) -> DemoResult<()> {
    let registry = EffectRegistry::with_builtins();
    if args.list {
        return list_effects(&registry);
    }

    let (Some(input), Some(output)) = (args.input, args.output) else {
        return Err("expected <input image> <output.png>".into());
    };

    let requests = args
        .effects
        .iter()
        .map(|arg| parse_effect_request(arg))
        .collect::<DemoResult<Vec<_>>>()?;

    let image = image::open(&input)
        .map_err(|e| format!("failed to open {}: {}", input.display(), e))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    tracing::info!("Loaded {} ({}x{})", input.display(), width, height);

    let settings = match &args.settings {
        Some(path) => PipelineSettings::load_from_file(path)?,
        None => PipelineSettings::default(),
    };

    let renderer = RenderThread::spawn(&settings, registry)?;
    renderer.surface_changed(width, height)?;
    renderer.set_source_rgba8(width, height, image.into_raw())?;

    for request in &requests {
        let id = renderer.add_effect(&request.effect_type)?;
        renderer.set_enabled(id, true)?;

        let parameters: Vec<Arc<Parameter>> = renderer.parameters(id)?;
        for (name, text) in &request.assignments {
            let parameter = parameters
                .iter()
                .find(|p| p.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("{} has no parameter '{}'", request.effect_type, name))?;
            let stored = assign(parameter, text)?;
            tracing::info!("{} {}: {}", request.effect_type, parameter.name(), stored);
        }
    }

    renderer.capture_png(&output)?;

    for (id, reason) in renderer.failures()? {
        tracing::warn!("Effect {} was skipped: {}", id, reason);
    }

    renderer.shutdown()?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    // Logging config comes from the settings file when one is given
    let log_config = args
        .settings
        .as_ref()
        .and_then(|path| PipelineSettings::load_from_file(path).ok())
        .unwrap_or_default()
        .log;

    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Spectaculum v{}", env!("CARGO_PKG_VERSION"));

    if !args.list && (args.input.is_none() || args.output.is_none()) {
        eprintln!("Usage: spectaculum-demo [--settings <file.xml>] <input image> <output.png> [effect[:Name=value,...]]...");
        eprintln!("       spectaculum-demo --list");
        process::exit(2);
    }

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effect_request() {
        let request = parse_effect_request("contrast_brightness:Contrast=1.5, Brightness=0.5").unwrap();
        assert_eq!(request.effect_type, "contrast_brightness");
        assert_eq!(
            request.assignments,
            vec![
                ("Contrast".to_string(), "1.5".to_string()),
                ("Brightness".to_string(), "0.5".to_string())
            ]
        );

        let bare = parse_effect_request("flip").unwrap();
        assert!(bare.assignments.is_empty());

        assert!(parse_effect_request("flip:Mode").is_err());
    }

    #[test]
    fn test_assign_parses_by_kind() {
        let mode = Parameter::int("Mode", 0, 3, 1);
        assert_eq!(assign(&mode, "2").unwrap(), ParameterValue::Int(2));
        assert!(assign(&mode, "two").is_err());
        assert!(assign(&mode, "7").is_err());

        let color = Parameter::choice("Color", ["White", "Red"], 0);
        assert_eq!(assign(&color, "red").unwrap(), ParameterValue::Choice(1));
        assert_eq!(assign(&color, "0").unwrap(), ParameterValue::Choice(0));

        let edges = Parameter::bool("Edges", true);
        assert_eq!(assign(&edges, "false").unwrap(), ParameterValue::Bool(false));
    }

    #[test]
    fn test_parse_args_positional_order() {
        let args: Vec<String> = ["--settings", "s.xml", "in.png", "out.png", "flip", "color_filter:Color=Red"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let parsed = parse_args(&args).unwrap();
        assert_eq!(parsed.settings, Some(PathBuf::from("s.xml")));
        assert_eq!(parsed.input, Some(PathBuf::from("in.png")));
        assert_eq!(parsed.output, Some(PathBuf::from("out.png")));
        assert_eq!(parsed.effects, vec!["flip", "color_filter:Color=Red"]);
        assert!(!parsed.list);
    }
}

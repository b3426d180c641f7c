use std::path::Path;
use std::process::ExitCode;

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use sf::cli::{self, ConfigSource};
use sf::config::{self, Config, ConfigError};
use sf::host::Host;
use sf::script::{ExecMode, Interpreter, State, Value};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("sf: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    let (config, errors) = load_config(&args.config);
    init_logging(&config, args.debug);
    for e in &errors {
        warn!("config {e}");
    }

    if args.list_names {
        let interp = Interpreter::with_host(Host::shared());
        for name in interp.info_names() {
            println!("{name}");
        }
    }

    if let Some(expr) = &args.expr {
        if !evaluate(expr, args.typed) {
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = &args.script {
        if !run_script(path, &config) {
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn load_config(source: &ConfigSource) -> (Config, Vec<ConfigError>) {
    let path = match source {
        ConfigSource::Disabled => return (Config::default(), Vec::new()),
        ConfigSource::File(p) => Some(p.clone()),
        ConfigSource::UserDefault => config::find_user_config(),
    };
    let Some(path) = path else {
        return (Config::default(), Vec::new());
    };
    match Config::load_file(&path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("sf: warning: {}: {e}", path.display());
            (Config::default(), Vec::new())
        }
    }
}

/// `SF_LOG` wins over the config `log` key; `-d` over both.
fn init_logging(config: &Config, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SF_LOG").unwrap_or_else(|_| EnvFilter::new(&config.log))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn evaluate(expr: &str, typed: bool) -> bool {
    let mut interp = Interpreter::<()>::default();
    let mut result = Value::Undefined;
    if !interp.calculate(expr, &mut result) {
        eprintln!("sf: {}", interp.debug_text());
        return false;
    }
    if typed {
        println!("{}", result.to_stream());
    } else {
        println!("{result}");
    }
    true
}

fn run_script(path: &Path, config: &Config) -> bool {
    let src = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sf: {}: {e}", path.display());
            return false;
        }
    };
    let name = config.script_name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut interp = Interpreter::with_host(Host::shared());
    interp.set_script_name(&name);
    interp.set_max_loop_time(config.max_loop_time);
    interp.set_trace(config.trace);
    interp.set_listing(config.listing);

    let compiled = interp.compile(&src);
    flush(&mut interp);
    if !compiled {
        eprintln!("sf: {}", interp.debug_text());
        return false;
    }

    for mode in [ExecMode::Init, ExecMode::Run] {
        let state = interp.execute(mode);
        interp.dispatch_events();
        flush(&mut interp);
        if state == State::Error {
            eprintln!("sf: {}", interp.debug_text());
            return false;
        }
    }
    debug!(script = %name, exit = interp.exit_code().name(), "finished");
    true
}

fn flush(interp: &mut Interpreter<sf::binding::InformationScript>) {
    for line in interp.take_output() {
        println!("{line}");
    }
}

use ash::ExecContext;
use clap::Parser;

/// ash - a small POSIX-flavoured command interpreter
#[derive(Parser, Debug)]
#[command(name = "ash", version, about)]
struct Args {
    /// Execute the given script text and exit
    #[arg(short = 'c', num_args = 0..=1)]
    command: Option<Option<String>>,

    /// Log at debug level (otherwise `ASH_LOG`, default `warn`)
    #[arg(long)]
    debug: bool,

    /// Print the parsed script tree as JSON instead of running it
    #[arg(long)]
    dump_ast: bool,

    /// Script file or `$0`, followed by positional parameters
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    operands: Vec<String>,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_env("ASH_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    let mut argv = Vec::new();
    if let Some(command) = args.command {
        argv.push("-c".to_string());
        argv.extend(command);
    }
    argv.extend(args.operands);

    let mut ctx = ExecContext::default();
    let status = if args.dump_ast {
        ash::dump_ast(&argv, &mut ctx).await
    } else {
        ash::run(&argv, &mut ctx).await
    };
    std::process::exit(status);
}

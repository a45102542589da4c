use anyhow::{anyhow, Context as _, Result};
use cardinal::session::Session;
use cardinal::tlv::Value;
use clap::Parser as _;
use owo_colors::OwoColorize;
use pcsc::Context;
use std::ffi::CString;
use std::process::ExitCode;
use tracing::{debug, trace, trace_span};

#[derive(clap::Parser, Debug)]
struct Args {
    /// Minimum log level to print.
    #[arg(short, long, default_value = "warn")]
    loglevel: tracing::Level,

    /// Use a specific reader (see `readers`).
    #[arg(short, long)]
    reader: Option<String>,

    /// PAN/PIN-holder's PIN, required by `cap` and helpful for `info`.
    #[arg(short, long)]
    pin: Option<String>,

    /// Print sensitive fields (PAN, track data) in full instead of masked.
    #[arg(long, default_value_t = true, overrides_with = "no_redact")]
    redact: bool,
    #[arg(long = "no-redact")]
    no_redact: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn redact(&self) -> bool {
        self.redact && !self.no_redact
    }
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the crate version.
    Version,
    /// List connected PC/SC readers.
    Readers,
    /// Select the directory and print metadata for the card's last application.
    Info,
    /// List applications discoverable on the card.
    Listapps,
    /// Dump the application data (AFL records) for one listed application.
    Appdata {
        /// Index into the `listapps` output.
        index: usize,
    },
    /// Verify the PIN, generate an ARQC and derive a CAP one-time code.
    Cap {
        /// Transaction amount (major units, e.g. `12.34`). Requires `--challenge`.
        #[arg(short, long)]
        amount: Option<f64>,
        /// Numeric challenge from the reader's display, if this is a signing operation.
        #[arg(short, long)]
        challenge: Option<u64>,
    },
}

/// Exit codes, per the documented CLI contract: 0 success, 1 PIN/CAP failure, 2
/// reader/card not found or PIN missing, 3 inconsistent arguments.
const EXIT_OK: u8 = 0;
const EXIT_REJECTED: u8 = 1;
const EXIT_UNAVAILABLE: u8 = 2;
const EXIT_BAD_ARGS: u8 = 3;

fn select_reader(ctx: &Context, name: &Option<String>) -> Result<CString> {
    let span = trace_span!("select_reader", ?name);
    let _enter = span.enter();

    if let Some(name) = name {
        return Ok(CString::new(name.clone())?);
    }
    let mut buf = vec![0; ctx.list_readers_len()?];
    ctx.list_readers(&mut buf)?
        .next()
        .map(|r| r.to_owned())
        .ok_or_else(|| anyhow!("no PC/SC reader connected"))
}

fn connect(args: &Args) -> Result<(Context, cardinal::pcsc_channel::PcscChannel)> {
    let ctx = Context::establish(pcsc::Scope::User).context("establishing PC/SC context")?;
    let reader = select_reader(&ctx, &args.reader).map_err(|e| anyhow!(e))?;
    debug!(?reader, "connecting");
    let channel = cardinal::pcsc_channel::PcscChannel::connect(&ctx, &reader)
        .with_context(|| format!("connecting to reader {reader:?}"))?;
    Ok((ctx, channel))
}

fn print_tlv(tlv: &cardinal::tlv::Tlv, redact: bool, indent: usize) {
    for (tag, value) in tlv.iter() {
        let pad = "  ".repeat(indent);
        let name = tag.name().unwrap_or("Unknown");
        print!("{pad}{} {}", tag.cyan(), name.dimmed());
        match value {
            Value::Tlv(inner) => {
                println!();
                print_tlv(inner, redact, indent + 1);
            }
            Value::Many(items) => {
                println!();
                for item in items {
                    if let Some(inner) = item.as_tlv() {
                        print_tlv(inner, redact, indent + 1);
                    }
                }
            }
            _ => {
                let rendered = cardinal::tlv::render_element(tag, value, redact && tag.is_sensitive());
                println!(" = {}", rendered.green());
            }
        }
    }
}

fn run_version() -> Result<u8> {
    println!("cardinal {}", env!("CARGO_PKG_VERSION"));
    Ok(EXIT_OK)
}

fn run_readers(args: &Args) -> Result<u8> {
    let ctx = Context::establish(pcsc::Scope::User)?;
    let mut buf = vec![0; ctx.list_readers_len()?];
    let mut any = false;
    for name in ctx.list_readers(&mut buf)? {
        any = true;
        println!("{}", name.to_str()?);
    }
    if !any {
        eprintln!("{}", "no readers found".red());
        return Ok(EXIT_UNAVAILABLE);
    }
    let _ = args;
    Ok(EXIT_OK)
}

fn run_info(args: &Args) -> Result<u8> {
    let (_ctx, mut channel) = connect(args)?;
    let mut session = Session::new(&mut channel);

    let apps = session.list_applications()?;
    if apps.is_empty() {
        eprintln!("{}", "no applications found on card".red());
        return Ok(EXIT_UNAVAILABLE);
    }
    let app = apps.last().unwrap();
    let adf_name = app
        .get_alias("ADF_NAME")
        .and_then(Value::as_bytes)
        .ok_or_else(|| anyhow!("selected application is missing its ADF name"))?;
    session
        .select_application(adf_name)
        .context("selecting application")?;

    let metadata = session.get_metadata();
    println!("{}", "Metadata".bold());
    println!("  PIN retries left: {:?}", metadata.pin_retries);
    println!("  ATC: {:?}", metadata.atc);
    println!("  Last online ATC: {:?}", metadata.last_online_atc);

    let opts = session.get_processing_options().context("GET PROCESSING OPTIONS")?;
    let app_data = session.get_application_data(&opts.afl).context("reading AFL records")?;
    println!("{}", "Application Data".bold());
    print_tlv(&app_data, args.redact(), 1);

    Ok(EXIT_OK)
}

fn run_listapps(args: &Args) -> Result<u8> {
    let (_ctx, mut channel) = connect(args)?;
    let mut session = Session::new(&mut channel);
    let apps = session.list_applications()?;
    if apps.is_empty() {
        eprintln!("{}", "no applications found on card".red());
        return Ok(EXIT_UNAVAILABLE);
    }
    for (i, app) in apps.iter().enumerate() {
        let label = app
            .get_alias("APP_LABEL")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| "<unnamed>".to_string());
        let adf = app
            .get_alias("ADF_NAME")
            .and_then(Value::as_bytes)
            .map(hex::encode_upper)
            .unwrap_or_default();
        println!("{}: {} ({})", i.to_string().cyan(), label, adf.dimmed());
    }
    Ok(EXIT_OK)
}

fn run_appdata(args: &Args, index: usize) -> Result<u8> {
    let (_ctx, mut channel) = connect(args)?;
    let mut session = Session::new(&mut channel);
    let apps = session.list_applications()?;
    let app = match apps.get(index) {
        Some(app) => app,
        None => {
            eprintln!("{}", format!("no application at index {index}").red());
            return Ok(EXIT_UNAVAILABLE);
        }
    };
    let adf_name = app
        .get_alias("ADF_NAME")
        .and_then(Value::as_bytes)
        .ok_or_else(|| anyhow!("application entry is missing its ADF name"))?;
    session.select_application(adf_name).context("selecting application")?;
    let opts = session.get_processing_options().context("GET PROCESSING OPTIONS")?;
    let app_data = session.get_application_data(&opts.afl).context("reading AFL records")?;
    print_tlv(&app_data, args.redact(), 0);
    Ok(EXIT_OK)
}

fn run_cap(args: &Args, amount: Option<f64>, challenge: Option<u64>) -> Result<u8> {
    if amount.is_some() && challenge.is_none() {
        eprintln!("{}", "--amount requires --challenge".red());
        return Ok(EXIT_BAD_ARGS);
    }
    let pin = match &args.pin {
        Some(pin) => pin,
        None => {
            eprintln!("{}", "--pin is required for cap".red());
            return Ok(EXIT_UNAVAILABLE);
        }
    };

    let (_ctx, mut channel) = connect(args)?;
    let mut session = Session::new(&mut channel);

    match cardinal::cap::generate_cap_value(&mut session, pin, amount, challenge) {
        Ok(code) => {
            println!("{}", format!("{code:08}").bold().green());
            Ok(EXIT_OK)
        }
        Err(cardinal::Error::InvalidPin(status)) => {
            eprintln!("{}", format!("PIN rejected: {status}").red());
            Ok(EXIT_REJECTED)
        }
        Err(e) => {
            eprintln!("{}", format!("CAP generation failed: {e}").red());
            Ok(EXIT_REJECTED)
        }
    }
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(args.loglevel)
        .init();
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "starting up");

    let code = match &args.command {
        Command::Version => run_version(),
        Command::Readers => run_readers(&args),
        Command::Info => run_info(&args),
        Command::Listapps => run_listapps(&args),
        Command::Appdata { index } => run_appdata(&args, *index),
        Command::Cap { amount, challenge } => run_cap(&args, *amount, *challenge),
    }?;

    Ok(ExitCode::from(code))
}

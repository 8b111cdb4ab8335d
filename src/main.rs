use std::{
    error::Error,
    io::{self, BufRead, Write},
};

use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use specloop::{
    builder::ReviewDecision,
    config::{config_path, Settings},
    doctest::{split_case_text, DoctestCase, Output},
    explorer::{ArtifactStore, CrosshairExplorer, Explorer},
    llm::{LlmClient, Provider},
    persistence::SessionStore,
    sandbox::PythonSandbox,
    signature::FunctionSignature,
    synth::LlmSynthesizer,
    workflow::{Exploration, ReviewKind, Session, StepOutcome, WorkflowState},
};

#[derive(Parser)]
#[command(
    name = "specloop",
    version,
    about = "Synthesize a Python function from examples, then verify and refute it against a growing doctest set."
)]
struct Cli {
    #[arg(short, long, global = true, help = "Debug logging (RUST_LOG overrides)")]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start a session: seed doctests, synthesize and verify a first candidate
    Run(RunArgs),
    /// Accept or override the cases waiting for review
    Review(ReviewArgs),
    /// Challenge the verified code with new inputs
    Refute(FunctionArgs),
    /// Print the saved session for a function, or delete it with --clear
    Show(ShowArgs),
    /// Check the interpreter, the explorer and the provider key
    Check,
    /// Write provider and workflow settings
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(long, help = "Signature, e.g. \"multiply(a: int, b: int) -> int\"")]
    signature: String,

    #[arg(long, default_value = "", help = "Docstring describing the behavior")]
    doc: String,

    #[arg(
        long = "case",
        required = true,
        help = "Example as `input => output`, e.g. \"(2, 3) => 6\" or \"(0, 0) => Error\" (repeatable)"
    )]
    cases: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct FunctionArgs {
    #[arg(long = "function", help = "Function name of the session")]
    function: String,
}

#[derive(Args, Debug, Clone)]
struct ReviewArgs {
    #[command(flatten)]
    target: FunctionArgs,

    #[arg(long, default_value_t = false, help = "Accept every observed output without prompting")]
    accept_all: bool,
}

#[derive(Args, Debug, Clone)]
struct ShowArgs {
    #[command(flatten)]
    target: FunctionArgs,

    #[arg(long, default_value_t = false, help = "Delete the saved session instead of printing it")]
    clear: bool,
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    #[arg(long, help = "openai | anthropic | huggingface")]
    provider: Option<Provider>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, help = "Python interpreter used to run candidates")]
    python: Option<String>,

    #[arg(long, help = "Use CrossHair for extra inputs")]
    explorer: Option<bool>,

    #[arg(long, help = "Verification attempts per run")]
    attempts: Option<usize>,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("specloop={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();
}

/// Long-lived collaborators a session borrows.
struct Runtime {
    settings: Settings,
    synth: LlmSynthesizer<LlmClient>,
    sandbox: PythonSandbox,
    explorer: CrosshairExplorer,
    artifacts: ArtifactStore,
}

impl Runtime {
    fn new(settings: Settings) -> Result<Self, Box<dyn Error>> {
        let client = LlmClient::new(
            settings.provider_config(),
            settings.retry_policy(),
            settings.request_timeout(),
        )?;

        Ok(Self {
            synth: LlmSynthesizer::new(client),
            sandbox: settings.sandbox(),
            explorer: CrosshairExplorer::new(&settings.explorer.program),
            artifacts: ArtifactStore::new(settings.artifact_dir()),
            settings,
        })
    }

    fn session(&self) -> Session<'_> {
        let session = Session::new(&self.synth, &self.synth, &self.sandbox, self.settings.limits());
        if !self.settings.explorer.enabled {
            return session;
        }
        session.with_exploration(Exploration {
            explorer: &self.explorer,
            store: &self.artifacts,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        CliCommand::Run(args) => run(args),
        CliCommand::Review(args) => review(args),
        CliCommand::Refute(args) => refute(args),
        CliCommand::Show(args) => show(args),
        CliCommand::Check => check(),
        CliCommand::Config(args) => configure(args),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    let signature = FunctionSignature::parse(&args.signature)?;

    let pairs = args
        .cases
        .iter()
        .map(|text| split_case_text(text))
        .collect::<Result<Vec<_>, _>>()?;

    let runtime = Runtime::new(settings)?;
    let mut state = WorkflowState::new(signature, args.doc, runtime.settings.workflow.conflict_policy);
    let outcome = runtime.session().start(&mut state, &pairs)?;

    let store = SessionStore::default();
    store.save(&state)?;
    report(&state, outcome)
}

fn review(args: ReviewArgs) -> Result<(), Box<dyn Error>> {
    let store = SessionStore::default();
    let mut state = store.load(&args.target.function)?;

    let Some(pending) = state.pending.clone() else {
        println!("Nothing to review for {}.", state.signature.name);
        return Ok(());
    };

    let decisions = if args.accept_all {
        vec![ReviewDecision::Accept; pending.proposals.len()]
    } else {
        match prompt_decisions(&pending.proposals, state.signature.returns_str())? {
            Some(decisions) => decisions,
            None => {
                println!("Review aborted; nothing changed.");
                return Ok(());
            }
        }
    };

    let runtime = Runtime::new(Settings::load()?)?;
    let outcome = runtime.session().review(&mut state, &decisions)?;
    store.save(&state)?;
    report(&state, outcome)
}

fn refute(args: FunctionArgs) -> Result<(), Box<dyn Error>> {
    let store = SessionStore::default();
    let mut state = store.load(&args.function)?;

    let runtime = Runtime::new(Settings::load()?)?;
    let outcome = runtime.session().refute(&mut state)?;
    store.save(&state)?;
    report(&state, outcome)
}

fn show(args: ShowArgs) -> Result<(), Box<dyn Error>> {
    let store = SessionStore::default();
    let name = &args.target.function;

    if args.clear {
        if store.remove(name)? {
            println!("Removed the session for {name}.");
        } else {
            println!("No saved session for {name}.");
        }
        return Ok(());
    }

    let state = store.load(name)?;

    println!("{}", state.signature);
    if !state.docstring.is_empty() {
        println!("    \"\"\"{}\"\"\"", state.docstring);
    }
    println!();
    println!("Doctests ({}):", state.doctests.len());
    for case in &state.doctests {
        println!("  {} => {}", case.input, case.expected);
    }

    match &state.code {
        Some(code) => println!("\nVerified code:\n{code}"),
        None => println!("\nNo verified code."),
    }
    if let Some(pending) = &state.pending {
        println!("\n{} case(s) await review ({}).", pending.proposals.len(), kind_label(pending.kind));
    }
    println!("\nUpdated {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

fn check() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    let mut healthy = true;

    match settings.sandbox().probe() {
        Ok(version) => println!("interpreter  ok    {} ({version})", settings.sandbox.python),
        Err(e) => {
            healthy = false;
            println!("interpreter  FAIL  {e}");
        }
    }

    let explorer = CrosshairExplorer::new(&settings.explorer.program);
    match explorer.check_available() {
        Ok(()) => println!("explorer     ok    {}", settings.explorer.program),
        Err(e) if settings.explorer.enabled => {
            healthy = false;
            println!("explorer     FAIL  {e}");
        }
        Err(e) => println!("explorer     off   {e}"),
    }

    println!("sessions     {}", SessionStore::default().root().display());
    if settings.explorer.enabled {
        println!("artifacts    {}", ArtifactStore::new(settings.artifact_dir()).dir().display());
    }

    let provider = settings.llm.provider;
    if settings.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        println!("provider     ok    {provider} ({})", settings.provider_config().model);
    } else {
        healthy = false;
        println!("provider     FAIL  no key; set {} or SPECLOOP_API_KEY", provider.key_env());
    }

    if healthy {
        Ok(())
    } else {
        Err("environment check failed".into())
    }
}

fn configure(args: ConfigArgs) -> Result<(), Box<dyn Error>> {
    let path = config_path();
    let mut settings = Settings::load_from(&path)?;

    if let Some(provider) = args.provider {
        settings.llm.provider = provider;
    }
    if let Some(model) = args.model {
        settings.llm.model = Some(model);
    }
    if let Some(key) = args.api_key {
        settings.llm.api_key = Some(key);
    }
    if let Some(python) = args.python {
        settings.sandbox.python = python;
    }
    if let Some(enabled) = args.explorer {
        settings.explorer.enabled = enabled;
    }
    if let Some(attempts) = args.attempts {
        settings.workflow.attempts = attempts;
    }

    settings.save_to(&path)?;
    println!("Saved {}", path.display());
    Ok(())
}

/// Prompts once per proposal. `None` when stdin closes before the last
/// decision.
fn prompt_decisions(proposals: &[DoctestCase], returns_str: bool) -> io::Result<Option<Vec<ReviewDecision>>> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut decisions = Vec::with_capacity(proposals.len());

    println!("Press Enter to accept the observed output, or type the expected one (`Error` for a raise).");
    for (i, case) in proposals.iter().enumerate() {
        loop {
            print!("[{}/{}] {} => {}  ? ", i + 1, proposals.len(), case.input, case.expected);
            io::stdout().flush()?;

            let Some(line) = lines.next().transpose()? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                decisions.push(ReviewDecision::Accept);
                break;
            }
            match Output::parse(&line, returns_str) {
                Ok(output) => {
                    debug!(input = %case.input, %output, "override");
                    decisions.push(ReviewDecision::Override(output));
                    break;
                }
                Err(e) => println!("  not a literal: {e}"),
            }
        }
    }

    Ok(Some(decisions))
}

fn kind_label(kind: ReviewKind) -> &'static str {
    match kind {
        ReviewKind::Suggested => "suggested",
        ReviewKind::Refuted => "refutation",
    }
}

fn report(state: &WorkflowState, outcome: StepOutcome) -> Result<(), Box<dyn Error>> {
    let name = &state.signature.name;
    match outcome {
        StepOutcome::InvalidInput(reason) => Err(format!("no usable doctest: {reason}").into()),
        StepOutcome::SynthesisFailed { least_bad } => {
            if let Some(entry) = least_bad {
                println!("Closest candidate ({} failing case(s)):\n{}", entry.failures, entry.code);
            }
            Err("no candidate could be synthesized".into())
        }
        StepOutcome::Exhausted { least_bad } => {
            match least_bad {
                Some(entry) => println!("Least-bad candidate ({} failing case(s)):\n{}", entry.failures, entry.code),
                None => warn!(function = %name, "ledger is empty"),
            }
            Err("candidate could not satisfy all cases".into())
        }
        StepOutcome::AwaitingReview { kind, proposals } => {
            if let Some(code) = &state.code {
                println!("{code}\n");
            }
            println!("{} {} case(s) to review:", proposals.len(), kind_label(kind));
            for case in &proposals {
                println!("  {} => {}", case.input, case.expected);
            }
            println!("\nNext: specloop review --function {name}");
            Ok(())
        }
        StepOutcome::Final(code) => {
            println!("{code}");
            println!("\n# verified against {} doctest(s); challenge it with `specloop refute --function {name}`", state.doctests.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_accepts_clear() {
        let cli = Cli::try_parse_from(["specloop", "show", "--function", "size", "--clear"]).unwrap();
        match cli.command {
            CliCommand::Show(args) => {
                assert_eq!(args.target.function, "size");
                assert!(args.clear);
            }
            _ => panic!("expected show"),
        }

        let cli = Cli::try_parse_from(["specloop", "show", "--function", "size"]).unwrap();
        assert!(matches!(cli.command, CliCommand::Show(ShowArgs { clear: false, .. })));
    }
}

use anyhow::{bail, Context};
use argh::FromArgs;
use malq::api::Api;
use malq::auth::{ApiKey, AuthClient};
use malq::cache::{Artifact, ReportCache};
use malq::flow;
use malq::job::{Event, UploadPoll};
use malq::session::{self, DataDir, SettingsFile};
use malq::transport::http::HttpTransport;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// malcore client: upload a binary for analysis and render the report
struct Args {
    /// data directory (default: ~/.malq)
    #[argh(option)]
    data_dir: Option<PathBuf>,

    /// api base url override
    #[argh(option)]
    api_base: Option<String>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    Login(LoginArgs),
    Report(ReportArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "analyze")]
/// submit a file for analysis (cached results are reused)
struct AnalyzeArgs {
    /// the file to analyze
    #[argh(positional)]
    file: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "login")]
/// obtain and store an api key
struct LoginArgs {
    /// account email
    #[argh(option)]
    email: Option<String>,

    /// account password
    #[argh(option)]
    password: Option<String>,

    /// use an existing api key instead of email/password
    #[argh(option)]
    api_key: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "report")]
/// render a cached report json without touching the network
struct ReportArgs {
    /// path to a cached report json
    #[argh(positional)]
    json: PathBuf,
}

fn print_result(result: &flow::AnalysisResult) {
    if let Some(path) = &result.html_path {
        println!("{}", path.display());
    } else {
        // nothing persisted, dump the document itself
        println!("{}", result.html);
    }
}

async fn analyze(data_dir: &DataDir, api: Api, args: AnalyzeArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to open file: {}", args.file.display()))?;
    let artifact = Artifact::from_path(&args.file, bytes);
    let mut cache = ReportCache::open(data_dir.cache_dir())?;

    let settings = SettingsFile::load(data_dir.settings_path());
    let key = match session::stored_api_key(&settings) {
        Some(key) => ApiKey(key),
        None => bail!("no api key stored, run `malq login` first"),
    };

    let (events, rx) = flume::unbounded();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv_async().await {
            match event {
                Event::Status(status) => info!("[status] {}", status),
                Event::Progress(direction, progress) => {
                    debug!("[transfer] {:?} {:?}", direction, progress)
                }
            }
        }
    });

    let controller = UploadPoll::new(HttpTransport::new()?, api, events);
    let result = flow::analyze(&mut cache, &controller, &artifact, &key).await;
    drop(controller); // closes the event channel so the printer finishes
    let _ = printer.await;

    match result? {
        Some(result) => {
            print_result(&result);
            Ok(())
        }
        // single submission from the cli, nothing can preempt it
        None => unreachable!("cli job superseded"),
    }
}

async fn login(data_dir: &DataDir, api: Api, args: LoginArgs) -> anyhow::Result<()> {
    let transport = HttpTransport::new()?;
    let auth = AuthClient::new(&transport, &api);

    let key = match args {
        LoginArgs {
            api_key: Some(key), ..
        } => ApiKey(key),
        LoginArgs {
            email: Some(email),
            password: Some(password),
            ..
        } => auth.login(&email, &password).await?,
        _ => bail!("provide either --api-key or both --email and --password"),
    };

    auth.validate(&key).await?;

    let mut settings = SettingsFile::load(data_dir.settings_path());
    session::store_api_key(&mut settings, &key.0)?;
    println!("logged in successfully");
    Ok(())
}

fn report(args: ReportArgs) -> anyhow::Result<()> {
    let result = flow::render_cached(&args.json)?;
    print_result(&result);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    let data_dir = args
        .data_dir
        .map(DataDir::new)
        .unwrap_or_else(DataDir::default_location);
    let api = args.api_base.map(Api::new).unwrap_or_default();

    match args.command {
        Command::Analyze(cmd) => analyze(&data_dir, api, cmd).await,
        Command::Login(cmd) => login(&data_dir, api, cmd).await,
        Command::Report(cmd) => report(cmd),
    }
}

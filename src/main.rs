use cei_migrate::{
    config::{DEFAULT_ID_PREFIX, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR},
    corpus::{self, CorpusError, Selection},
    side_table::{FRAMEWORKS_TABLE, TITLES_TABLE},
    variant::{DEFAULT_CONTRIBUTING_MODULE, DEFAULT_EXPOSURE_CATEGORY},
    MigrationConfig, MigrationVariant, ReportFormat, RunReporter, RunSummary,
};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cei-migrate")]
#[command(about = "Migrate CEI definitions to the new schema and maintain the curated side tables")]
struct Args {
    /// Directory holding the old CEI JSON files
    #[arg(long, value_name = "DIR", default_value = DEFAULT_INPUT_DIR)]
    input_dir: PathBuf,

    /// Directory the migrated CEI JSON files are written to
    #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Framework normalization table
    #[arg(long, value_name = "CSV", default_value = FRAMEWORKS_TABLE)]
    frameworks_table: PathBuf,

    /// CEI title / finding title / assessment id table
    #[arg(long, value_name = "CSV", default_value = TITLES_TABLE)]
    titles_table: PathBuf,

    /// Migration rules to apply (v1, v2 or v3)
    #[arg(long, default_value = "v3")]
    variant: MigrationVariant,

    /// Prefix added to requested ids that lack it
    #[arg(long, default_value = DEFAULT_ID_PREFIX)]
    id_prefix: String,

    /// Fixed contributing module for v2 and v3
    #[arg(long, default_value = DEFAULT_CONTRIBUTING_MODULE)]
    contributing_module: String,

    /// Fixed exposure category for v3
    #[arg(long, default_value = DEFAULT_EXPOSURE_CATEGORY)]
    exposure_category: String,

    /// Summary format: console, json or yaml
    #[arg(long, default_value = "console")]
    report_format: ReportFormat,

    /// Run one operation and exit instead of showing the menu
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate the framework normalization table
    DetectFrameworks,
    /// Regenerate the CEI title table
    ExtractTitles,
    /// Migrate every CEI, or only the listed ids
    Migrate {
        /// Comma-separated CEI ids
        #[arg(long)]
        ids: Option<String>,
    },
}

impl Args {
    fn config(&self) -> MigrationConfig {
        MigrationConfig {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            frameworks_table: self.frameworks_table.clone(),
            titles_table: self.titles_table.clone(),
            variant: self.variant,
            id_prefix: self.id_prefix.clone(),
            contributing_module: self.contributing_module.clone(),
            exposure_category: self.exposure_category.clone(),
        }
    }
}

fn main() {
    init_tracing();

    let args = Args::parse();
    let config = args.config();
    let reporter = RunReporter::new().with_format(args.report_format);

    match &args.command {
        None => run_menu(&config, &reporter),
        Some(command) => {
            let result = match command {
                Command::DetectFrameworks => corpus::detect_frameworks(&config),
                Command::ExtractTitles => corpus::extract_titles(&config),
                Command::Migrate { ids: None } => corpus::migrate(&config, &Selection::All),
                Command::Migrate { ids: Some(ids) } => {
                    corpus::migrate(&config, &Selection::parse(ids, &config.id_prefix))
                }
            };
            if !print_outcome(result, &reporter) {
                process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cei_migrate=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_menu() {
    println!("\n{}", "=".repeat(50));
    println!("CEI Migration Tool");
    println!("{}", "=".repeat(50));
    println!("1. Detect all frameworks");
    println!("2. Extract all titles");
    println!("3. Migrate all CEIs");
    println!("4. Migrate specific CEIs");
    println!("5. Exit");
    println!("{}", "=".repeat(50));
}

/// Print `message` and read one trimmed line. `None` on end of input.
fn prompt(message: &str) -> Option<String> {
    print!("{}", message);
    let _ = io::stdout().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn run_menu(config: &MigrationConfig, reporter: &RunReporter) {
    loop {
        print_menu();
        let Some(choice) = prompt("\nEnter your choice (1-5): ") else {
            break;
        };

        match choice.as_str() {
            "1" => {
                print_outcome(corpus::detect_frameworks(config), reporter);
            }
            "2" => {
                print_outcome(corpus::extract_titles(config), reporter);
            }
            "3" => {
                print_outcome(corpus::migrate(config, &Selection::All), reporter);
            }
            "4" => {
                let Some(line) = prompt("Enter CEI ids (comma-separated): ") else {
                    break;
                };
                let selection = Selection::parse(&line, &config.id_prefix);
                if matches!(&selection, Selection::Ids(ids) if ids.is_empty()) {
                    println!("\nNo ids entered.");
                    continue;
                }
                print_outcome(corpus::migrate(config, &selection), reporter);
            }
            "5" => {
                println!("\nExiting...");
                break;
            }
            _ => println!("\nInvalid choice. Please enter a number from 1 to 5."),
        }
    }
}

/// Print the summary or the failure report. Returns whether the run succeeded.
fn print_outcome(result: Result<RunSummary, CorpusError>, reporter: &RunReporter) -> bool {
    let rendered = match result {
        Ok(summary) => {
            match reporter.format_summary(&summary) {
                Ok(text) => println!("\n{}", text),
                Err(e) => eprintln!("\n❌ Error: {}", e),
            }
            return true;
        }
        Err(CorpusError::PreconditionFailed(report)) => reporter.format_validation(&report),
        Err(CorpusError::OutputCollision(collisions)) => {
            let mut text = String::from("=== Output Collision ===\n  No files were written.\n");
            for collision in &collisions {
                text.push_str(&format!("\n  {} would be written by:\n", collision.file_name));
                for source in &collision.sources {
                    text.push_str(&format!("    - {}\n", source.display()));
                }
            }
            Ok(text)
        }
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            return false;
        }
    };

    match rendered {
        Ok(text) => println!("\n{}", text),
        Err(e) => eprintln!("\n❌ Error: {}", e),
    }
    false
}

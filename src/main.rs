use clap::{Parser, Subcommand};
use kiln::compiler::Compiler;
use kiln::data_source::FilesystemDataSource;
use kiln::filters::FilterRegistry;
use kiln::rules::load_rules;
use kiln::site::Site;
use kiln::{config, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Rule-driven static content compiler")]
#[command(long_about = "\
Rule-driven static content compiler

Items under content/ are compiled through the filters and layouts named in
rules.toml and written to output/. Only items that changed since the last
run (or that depend on something that changed) are recompiled.

Site structure:

  site/
  ├── config.toml          # Site config (optional, see 'kiln gen-config')
  ├── rules.toml           # [[compile]], [[route]] and [[layout]] rules
  ├── content/             # Items; +++ fenced TOML front matter
  │   ├── index.md         # Identifier /
  │   └── about.md         # Identifier /about/
  ├── layouts/
  │   └── default.html     # Layout /default/
  ├── lib/                 # Helper code, tracked for outdatedness only
  └── tmp/                 # Checksums and dependency graph between runs")]
#[command(version)]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    site: PathBuf,

    /// Show debug diagnostics
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile outdated items and write routed output
    Compile {
        /// Ignore stored checksums and recompile everything
        #[arg(long)]
        force: bool,
    },
    /// Report which reps are outdated and why, without compiling
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compile { force } => {
            let (site, rules) = load_site(&cli.site)?;
            let filters = FilterRegistry::with_builtins();

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_compile_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = Compiler::new(site, &rules, &filters)
                .with_events(tx)
                .run(force);
            printer.join().map_err(|_| "output thread panicked")?;
            output::print_summary(&result?);
        }
        Command::Check => {
            let (site, rules) = load_site(&cli.site)?;
            let filters = FilterRegistry::with_builtins();
            let report = Compiler::new(site, &rules, &filters).outdatedness_report()?;
            output::print_status_report(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the site at `root` and prepare its reps from the rule file.
fn load_site(root: &std::path::Path) -> Result<(Site, kiln::rules::RuleSet), Box<dyn std::error::Error>> {
    let mut source = FilesystemDataSource::new(root);
    let mut site = Site::load(root, &mut source)?;
    let rules = load_rules(&site.rules_path())?;
    site.prepare(&rules)?;
    Ok((site, rules))
}

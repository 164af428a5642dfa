//! `dotbot run`: apply the document, a document piped on stdin, or a single
//! directive given on the command line.
use std::io::{Read as _, Write as _};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};

use super::{CommandSetup, finish};
use crate::cli::{GlobalOpts, RunOpts};
use crate::config::{self, Document, Mapping, Node, profiles};
use crate::directives::{Context, DirectiveList, Registry, RunOutcome};
use crate::logging::{Log, Logger};
use crate::update::{self, repo};

/// Run the `run` command, which is also the default command.
///
/// # Errors
///
/// Returns an error if the environment cannot be discovered, the document
/// cannot be loaded, or any directive failed.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<()> {
    execute(CommandSetup::init()?, global, opts, log)
}

/// [`run`] over an explicit setup.
///
/// # Errors
///
/// Same as [`run`].
pub fn execute(
    setup: CommandSetup,
    global: &GlobalOpts,
    opts: &RunOpts,
    log: &Arc<Logger>,
) -> Result<()> {
    match opts.directive.as_deref() {
        Some("template") => render_template(setup, &opts.args, log),
        Some(name) => run_directive(setup, global, name, &opts.args, log),
        None if opts.stdin => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed reading the document from stdin")?;
            run_text(setup, global, &text, log)
        }
        None => run_document(setup, global, log, true),
    }
}

fn context(setup: CommandSetup, global: &GlobalOpts, log: &Arc<Logger>) -> Result<Context> {
    let base_dir = setup.base_dir()?;
    let log: Arc<dyn Log> = Arc::clone(log) as Arc<dyn Log>;
    Ok(setup.into_context(log, base_dir, global.dry_run))
}

/// Apply the document found in the dotfiles directory (or `--config`).
/// `pull_repo` off skips pulling the dotfiles repository, as after a fresh
/// clone.
///
/// # Errors
///
/// Same as [`run`].
pub fn run_document(
    setup: CommandSetup,
    global: &GlobalOpts,
    log: &Arc<Logger>,
    pull_repo: bool,
) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let path = config::config_path(
        global.config.as_deref(),
        setup.state.base_dir().as_deref(),
        &cwd,
    )
    .with_context(|| {
        format!(
            "config file not found, looked for {}",
            config::DOCUMENT_NAMES.join(", ")
        )
    })?;
    let mut ctx = context(setup, global, log)?;
    log.debug(&format!("loading {}", path.display()));
    let mut doc = Document::load(&path)?;
    prepare(&ctx, &doc);

    if !ctx.escalator.is_child() {
        if doc.update_dotbot {
            update::self_update(log.as_ref(), &ctx.platform, &ctx.escalator, true)?;
        }
        if pull_repo
            && doc.update_repo
            && !repo::disabled_by_env()
            && repo::pull(log.as_ref(), ctx.executor.as_ref(), &ctx.base_dir)?
        {
            log.info("reloading configuration");
            doc = Document::load(&path)?;
            prepare(&ctx, &doc);
        }
    }

    let show_time = doc.show_total_time;
    let start = Instant::now();
    apply(&mut ctx, doc, &global.groups, &Registry::standard())?;
    if show_time {
        log.print_elapsed(start.elapsed());
    }
    finish(log)
}

/// Apply a document given as text, as sent to an elevated child. No
/// update checks run.
///
/// # Errors
///
/// Same as [`run`].
pub fn run_text(
    setup: CommandSetup,
    global: &GlobalOpts,
    text: &str,
    log: &Arc<Logger>,
) -> Result<()> {
    let mut ctx = context(setup, global, log)?;
    let doc = Document::parse(text, "<stdin>", &ctx.base_dir)?;
    prepare(&ctx, &doc);
    apply(&mut ctx, doc, &global.groups, &Registry::standard())?;
    finish(log)
}

fn run_directive(
    setup: CommandSetup,
    global: &GlobalOpts,
    name: &str,
    args: &[String],
    log: &Arc<Logger>,
) -> Result<()> {
    let ctx = context(setup, global, log)?;
    let body = Node::Mapping(parse_fields(args)?);
    let mut list = DirectiveList::new();
    list.push(name, Registry::standard().decode_one(name, body)?);
    list.run_all(&ctx);
    ctx.remove_temp_files();
    finish(log)
}

fn render_template(setup: CommandSetup, args: &[String], log: &Arc<Logger>) -> Result<()> {
    let Some(text) = args.first() else {
        anyhow::bail!("no template provided");
    };
    let base_dir = setup.base_dir()?;
    let ctx = setup.into_context(Arc::clone(log) as Arc<dyn Log>, base_dir, false);
    let rendered = crate::template::render(&ctx, text)?;
    writeln!(std::io::stdout().lock(), "{rendered}")?;
    Ok(())
}

/// Turn `key=value` arguments into a directive body. Values are read as
/// YAML scalars, so `force=true` is a boolean and `mode=755` a number.
///
/// # Errors
///
/// Returns an error for an argument without `=`.
pub fn parse_fields(args: &[String]) -> Result<Mapping> {
    let mut map = Mapping::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .with_context(|| format!("expected key=value, got {arg:?}"))?;
        let value = match serde_yaml::from_str::<Node>(value) {
            Ok(node) if config::node::is_scalar(&node) && !value.is_empty() => node,
            _ => Node::String(value.to_string()),
        };
        map.insert(key.into(), value);
    }
    Ok(map)
}

/// Load the document's variables and strip `PATH` entries on WSL.
fn prepare(ctx: &Context, doc: &Document) {
    ctx.vars.extend(&doc.vars);
    if doc.strip_path.is_empty() || !ctx.platform.is_wsl {
        return;
    }
    let Some(path) = std::env::var_os("PATH") else {
        return;
    };
    let stripped = config::strip_path_entries(&path.to_string_lossy(), &doc.strip_path);
    ctx.log.debug(&format!("stripped PATH: {stripped}"));
    // SAFETY: called on the main thread before any directive runs, while no
    // other thread reads the environment.
    #[allow(unsafe_code)]
    unsafe {
        std::env::set_var("PATH", stripped);
    }
}

/// Select groups, then decode and run the document's directive list.
///
/// # Errors
///
/// Returns a [`config::ConfigError`](crate::error::ConfigError) if the
/// profile cannot be resolved or the list cannot be decoded.
pub fn apply(
    ctx: &mut Context,
    doc: Document,
    cli_groups: &[String],
    registry: &Registry,
) -> Result<RunOutcome> {
    if let Some(selection) =
        profiles::resolve(cli_groups, &doc.profiles, &doc.default_profile, &*ctx)?
    {
        if let Some(profile) = &selection.profile {
            ctx.log.info(&format!("profile: {profile}"));
        }
        ctx.log
            .debug(&format!("groups: {}", selection.groups.join(", ")));
        ctx.groups = Some(selection.groups);
    }
    let list = registry.decode_list(doc.config)?;
    let outcome = list.run_all(ctx);
    ctx.remove_temp_files();
    Ok(outcome)
}

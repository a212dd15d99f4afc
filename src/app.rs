use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config;
use crate::data::{OpenFoodFactsService, ProductService, SampleProductService};
use crate::feed::FeedLoader;
use crate::listing::SortKey;
use crate::logging;
use crate::openfoodfacts;
use crate::ui;

/// Flags accepted by the binary on top of `--version` and `--help`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub page_size: Option<u32>,
    pub sort: Option<SortKey>,
    pub demo: bool,
}

impl RunOptions {
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = RunOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            match flag.as_str() {
                "--demo" => options.demo = true,
                "--config" => {
                    let value = flag_value(&flag, inline, &mut args)?;
                    options.config_file = Some(PathBuf::from(value));
                }
                "--page-size" => {
                    let value = flag_value(&flag, inline, &mut args)?;
                    let parsed = value
                        .parse::<u32>()
                        .with_context(|| format!("--page-size expects a number, got {value:?}"))?;
                    options.page_size = Some(parsed);
                }
                "--sort" => {
                    let value = flag_value(&flag, inline, &mut args)?;
                    options.sort = Some(value.parse()?);
                }
                other => bail!("unknown argument {other:?} (see --help)"),
            }
        }
        Ok(options)
    }
}

fn flag_value<I>(flag: &str, inline: Option<String>, rest: &mut I) -> Result<String>
where
    I: Iterator<Item = String>,
{
    match inline.or_else(|| rest.next()) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{flag} requires a value"),
    }
}

pub fn run(options: RunOptions) -> Result<()> {
    let log_path = logging::init(None).unwrap_or_else(|err| {
        eprintln!("logging disabled: {err:#}");
        None
    });

    let mut cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    if let Some(page_size) = options.page_size {
        cfg.api.page_size = page_size;
    }
    if let Some(sort) = options.sort {
        cfg.ui.default_sort = sort;
    }
    config::validate(&cfg).context("validate options")?;

    tracing::info!(
        version = crate::VERSION,
        page_size = cfg.api.page_size,
        sort = %cfg.ui.default_sort,
        demo = options.demo,
        log = ?log_path,
        "starting food-feed"
    );

    let (service, source_label): (Arc<dyn ProductService>, String) = if options.demo {
        (
            Arc::new(SampleProductService::default()),
            "the sample catalog".to_string(),
        )
    } else {
        let client = openfoodfacts::Client::new(openfoodfacts::ClientConfig {
            user_agent: cfg.api.user_agent.clone(),
            base_url: Some(cfg.api.base_url.clone()),
            timeout: Some(cfg.api.timeout),
        })
        .context("create openfoodfacts client")?;
        (
            Arc::new(OpenFoodFactsService::new(Arc::new(client))),
            host_label(&cfg.api.base_url),
        )
    };

    let loader = FeedLoader::new(service, cfg.api.page_size);
    let mut model = ui::Model::new(ui::Options {
        loader,
        sort: cfg.ui.default_sort,
        scroll_debounce: cfg.feed.scroll_debounce,
        scroll_threshold: cfg.feed.scroll_threshold,
        source_label,
    });
    let result = model.run();
    tracing::info!("food-feed exiting");
    result
}

fn host_label(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| base_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_run_flags() {
        let options = RunOptions::from_args(args(&[
            "--demo",
            "--page-size",
            "40",
            "--sort=product-name-desc",
            "--config",
            "/tmp/food.yaml",
        ]))
        .unwrap();
        assert!(options.demo);
        assert_eq!(options.page_size, Some(40));
        assert_eq!(options.sort, Some(SortKey::NameDesc));
        assert_eq!(options.config_file, Some(PathBuf::from("/tmp/food.yaml")));
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(RunOptions::from_args(args(&["--bogus"])).is_err());
        assert!(RunOptions::from_args(args(&["--page-size"])).is_err());
        assert!(RunOptions::from_args(args(&["--page-size", "many"])).is_err());
        assert!(RunOptions::from_args(args(&["--sort", "price"])).is_err());
    }

    #[test]
    fn host_label_falls_back_to_raw() {
        assert_eq!(
            host_label("https://world.openfoodfacts.org"),
            "world.openfoodfacts.org"
        );
        assert_eq!(host_label("not a url"), "not a url");
    }
}

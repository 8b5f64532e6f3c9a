use crate::plugins::registry::{BackendContext, CliPlugin};
use clap::{Arg, ArgMatches, Command};

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("HTTP User-Agent sent to the backend")
                .default_value("remote-downloader/0.1")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .help_heading("HTTP")
                .help("Per-request timeout in seconds; an expired poll counts as a transient failure")
                .default_value("15")
                .global(true)
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut BackendContext) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            ctx.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            ctx.timeout_secs = s.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn flags_land_in_context() {
        let plugin = HttpCliPlugin::new();
        let cmd = plugin.augment_command(Command::new("t"));
        let m = cmd.try_get_matches_from(["t", "--timeout-secs", "3", "--user-agent", "ua/1"]).unwrap();
        let mut ctx = BackendContext::new(Url::parse("http://localhost:5000").unwrap());
        plugin.apply_matches(&m, &mut ctx).unwrap();
        assert_eq!(ctx.timeout_secs, 3);
        assert_eq!(ctx.user_agent, "ua/1");
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let plugin = HttpCliPlugin::new();
        let m = plugin
            .augment_command(Command::new("t"))
            .try_get_matches_from(["t", "--timeout-secs", "soon"])
            .unwrap();
        let mut ctx = BackendContext::new(Url::parse("http://localhost:5000").unwrap());
        assert!(plugin.apply_matches(&m, &mut ctx).is_err());
    }
}

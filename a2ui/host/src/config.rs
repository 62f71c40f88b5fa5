use crate::wire::Framing;

pub const DEFAULT_SURFACE_ID: &str = "@default";
pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

/// Flags for `serve`. Anything left unset falls back to the environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServeArgs {
    /// Surface used by actions and writes that do not name one
    #[arg(long)]
    pub surface: Option<String>,

    /// Run the validator over every inbound message batch
    #[arg(long)]
    pub validate: bool,

    /// Outbound envelopes buffered before the session waits on stdout
    #[arg(long)]
    pub queue_cap: Option<usize>,

    /// Envelope framing on stdio
    #[arg(long, value_enum)]
    pub framing: Option<Framing>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub surface_id: String,
    pub validate_inbound: bool,
    pub outbound_queue_cap: usize,
    pub framing: Framing,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            surface_id: DEFAULT_SURFACE_ID.to_string(),
            validate_inbound: false,
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            framing: Framing::default(),
        }
    }
}

impl HostConfig {
    /// Reads `A2UI_SURFACE_ID`, `A2UI_VALIDATE_INBOUND`,
    /// `A2UI_OUTBOUND_QUEUE_CAP` and `A2UI_FRAMING`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            surface_id: lookup("A2UI_SURFACE_ID")
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or(defaults.surface_id),
            validate_inbound: lookup("A2UI_VALIDATE_INBOUND")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.validate_inbound),
            outbound_queue_cap: lookup("A2UI_OUTBOUND_QUEUE_CAP")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.outbound_queue_cap),
            framing: lookup("A2UI_FRAMING")
                .and_then(|raw| Framing::parse(&raw))
                .unwrap_or(defaults.framing),
        }
    }

    /// Command-line flags win over the environment.
    pub fn with_args(mut self, args: &ServeArgs) -> Self {
        if let Some(surface) = &args.surface {
            self.surface_id = surface.clone();
        }
        if args.validate {
            self.validate_inbound = true;
        }
        if let Some(cap) = args.queue_cap.filter(|cap| *cap > 0) {
            self.outbound_queue_cap = cap;
        }
        if let Some(framing) = args.framing {
            self.framing = framing;
        }
        self
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

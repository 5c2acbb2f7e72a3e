//! Left-to-right scan of the argument list into a [`RunPlan`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::config::ConfigOverrides;
use crate::error::ParseError;

use super::token::{classify, ArgToken, RunFlag, ValuedOption};
use super::{GroupKind, RunGroup, RunOptions, RunPlan};

/// Parse `args` into a run plan.
///
/// `config` is the initial override table (usually
/// [`ConfigOverrides::from_env`]); override flags are written into it and the
/// result is shared by every group, including groups declared before the flag.
pub fn parse<S: AsRef<str>>(
    args: &[S],
    mut config: ConfigOverrides,
) -> Result<RunPlan, ParseError> {
    let mut options = RunOptions::default();
    let mut groups: Vec<(GroupKind, Vec<String>)> = vec![(GroupKind::Sequential, Vec::new())];
    let mut iter = args.iter().map(AsRef::<str>::as_ref);

    while let Some(arg) = iter.next() {
        match classify(arg) {
            ArgToken::Mode(GroupKind::Sequential) => {
                if current_kind(&groups) != GroupKind::Sequential {
                    groups.push((GroupKind::Sequential, Vec::new()));
                }
            }
            ArgToken::Mode(kind) => groups.push((kind, Vec::new())),
            ArgToken::Silent => options.silent = true,
            ArgToken::Override { scope, var, value } => {
                let value = match value {
                    Some(v) => v,
                    None => iter
                        .next()
                        .ok_or_else(|| ParseError::MissingValue(arg.to_string()))?,
                };
                config.set(scope, var, value);
            }
            ArgToken::Flag(flag) => match flag {
                RunFlag::ContinueOnError => options.continue_on_error = true,
                RunFlag::PrintName => options.print_name = true,
                RunFlag::PrintLabel => options.print_label = true,
                RunFlag::Race => options.race = true,
            },
            ArgToken::Valued { option, inline } => {
                let value = match inline {
                    Some(v) => v,
                    None => iter
                        .next()
                        .ok_or_else(|| ParseError::MissingValue(option.name().to_string()))?,
                };
                apply_valued(&mut options, option, value)?;
            }
            ArgToken::Separator => {
                options.rest_args = iter.by_ref().map(str::to_string).collect();
            }
            ArgToken::Invalid(token) => return Err(ParseError::InvalidOption(token.to_string())),
            ArgToken::Pattern(pattern) => {
                if let Some((_, patterns)) = groups.last_mut() {
                    patterns.push(pattern.to_string());
                }
            }
        }
    }

    let config = Arc::new(config);
    let groups = groups
        .into_iter()
        .map(|(kind, patterns)| RunGroup {
            kind,
            patterns,
            config: Arc::clone(&config),
        })
        .collect();

    Ok(RunPlan {
        groups,
        config,
        options,
    })
}

fn current_kind(groups: &[(GroupKind, Vec<String>)]) -> GroupKind {
    groups.last().map_or(GroupKind::Sequential, |(kind, _)| *kind)
}

fn apply_valued(options: &mut RunOptions, option: ValuedOption, value: &str) -> Result<(), ParseError> {
    match option {
        ValuedOption::MaxParallel => {
            let n = value
                .parse::<NonZeroUsize>()
                .map_err(|_| ParseError::InvalidValue {
                    option: option.name().to_string(),
                    value: value.to_string(),
                })?;
            options.max_parallel = Some(n);
        }
        ValuedOption::NpmPath => options.npm_path = Some(value.to_string()),
    }
    Ok(())
}

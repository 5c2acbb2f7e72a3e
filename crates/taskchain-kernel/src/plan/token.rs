//! Classify raw arguments before they are folded into groups.

use std::sync::LazyLock;

use regex::Regex;

use super::GroupKind;

/// `--<scope>:<var>` with an optional `=<value>`. A bare `=` with nothing after
/// it does not match, so `--web:port=` is reported as an invalid option.
static OVERRIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--([^:]+?):([^=]+?)(?:=(.+))?$").expect("override pattern is valid")
});

/// Boolean run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunFlag {
    ContinueOnError,
    PrintName,
    PrintLabel,
    Race,
}

/// Run options that take a value, inline (`--opt=v`) or as the next argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValuedOption {
    MaxParallel,
    NpmPath,
}

impl ValuedOption {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ValuedOption::MaxParallel => "--max-parallel",
            ValuedOption::NpmPath => "--npm-path",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "--max-parallel" => Some(ValuedOption::MaxParallel),
            "--npm-path" => Some(ValuedOption::NpmPath),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ArgToken<'a> {
    Mode(GroupKind),
    Silent,
    Override {
        scope: &'a str,
        var: &'a str,
        value: Option<&'a str>,
    },
    Flag(RunFlag),
    Valued {
        option: ValuedOption,
        inline: Option<&'a str>,
    },
    /// `--`: everything after it is passed through to tasks.
    Separator,
    Invalid(&'a str),
    Pattern(&'a str),
}

pub(crate) fn classify(arg: &str) -> ArgToken<'_> {
    match arg {
        "-s" | "--sequential" | "--serial" => return ArgToken::Mode(GroupKind::Sequential),
        "-p" | "--parallel" => return ArgToken::Mode(GroupKind::Parallel),
        "-w" | "--waterfall" => return ArgToken::Mode(GroupKind::Waterfall),
        "--silent" => return ArgToken::Silent,
        "-c" | "--continue-on-error" => return ArgToken::Flag(RunFlag::ContinueOnError),
        "-n" | "--print-name" => return ArgToken::Flag(RunFlag::PrintName),
        "-l" | "--print-label" => return ArgToken::Flag(RunFlag::PrintLabel),
        "-r" | "--race" => return ArgToken::Flag(RunFlag::Race),
        "--" => return ArgToken::Separator,
        _ => {}
    }

    if !arg.starts_with('-') {
        return ArgToken::Pattern(arg);
    }

    let (name, inline) = match arg.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (arg, None),
    };
    if let Some(option) = ValuedOption::from_name(name) {
        return ArgToken::Valued { option, inline };
    }

    if let Some(caps) = OVERRIDE.captures(arg) {
        let (Some(scope), Some(var)) = (caps.get(1), caps.get(2)) else {
            return ArgToken::Invalid(arg);
        };
        return ArgToken::Override {
            scope: scope.as_str(),
            var: var.as_str(),
            value: caps.get(3).map(|m| m.as_str()),
        };
    }

    ArgToken::Invalid(arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags() {
        assert_eq!(classify("-s"), ArgToken::Mode(GroupKind::Sequential));
        assert_eq!(classify("--serial"), ArgToken::Mode(GroupKind::Sequential));
        assert_eq!(classify("--parallel"), ArgToken::Mode(GroupKind::Parallel));
        assert_eq!(classify("-w"), ArgToken::Mode(GroupKind::Waterfall));
    }

    #[test]
    fn overrides() {
        assert_eq!(
            classify("--web:port=8080"),
            ArgToken::Override { scope: "web", var: "port", value: Some("8080") }
        );
        assert_eq!(
            classify("--web:port"),
            ArgToken::Override { scope: "web", var: "port", value: None }
        );
        assert_eq!(
            classify("--web:url=http://a=b"),
            ArgToken::Override { scope: "web", var: "url", value: Some("http://a=b") }
        );
        assert_eq!(classify("--web:port="), ArgToken::Invalid("--web:port="));
        assert_eq!(classify("--:port=1"), ArgToken::Invalid("--:port=1"));
    }

    #[test]
    fn valued_options() {
        assert_eq!(
            classify("--max-parallel=3"),
            ArgToken::Valued { option: ValuedOption::MaxParallel, inline: Some("3") }
        );
        assert_eq!(
            classify("--npm-path"),
            ArgToken::Valued { option: ValuedOption::NpmPath, inline: None }
        );
    }

    #[test]
    fn patterns_and_invalid() {
        assert_eq!(classify("build:*"), ArgToken::Pattern("build:*"));
        assert_eq!(classify("-x"), ArgToken::Invalid("-x"));
        assert_eq!(classify("--nope"), ArgToken::Invalid("--nope"));
        assert_eq!(classify("--"), ArgToken::Separator);
    }
}

//! Binding spec parsing.
//!
//! A binding spec is a whitespace-separated list of `hostname:port` tokens,
//! e.g. `"app.local:3000 api.local:4000"`. Each token maps one hostname to
//! a backend listening on that local port.

/// One hostname bound to a local backend port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Lowercased hostname.
    pub hostname: String,
    /// Backend port on 127.0.0.1, never zero.
    pub target_port: u16,
}

/// Error type for binding parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("must specify at least one binding (--bind host:port)")]
    Empty,

    #[error("invalid binding {0:?}: expected host:port")]
    MissingColon(String),

    #[error("invalid binding {0:?}: empty hostname")]
    EmptyHost(String),

    #[error("invalid binding {token:?}: failed to parse target port {port:?}")]
    InvalidPort { token: String, port: String },
}

/// Parse a binding spec.
///
/// Order follows the input. A hostname given more than once keeps the slot
/// of its first occurrence and the port of its last.
pub fn parse_bindings(spec: &str) -> Result<Vec<Binding>, BindingError> {
    let mut bindings: Vec<Binding> = Vec::new();

    for token in spec.split_whitespace() {
        let binding = parse_token(token)?;
        match bindings.iter_mut().find(|b| b.hostname == binding.hostname) {
            Some(existing) => existing.target_port = binding.target_port,
            None => bindings.push(binding),
        }
    }

    if bindings.is_empty() {
        return Err(BindingError::Empty);
    }
    Ok(bindings)
}

fn parse_token(token: &str) -> Result<Binding, BindingError> {
    let (host, port) = token
        .rsplit_once(':')
        .ok_or_else(|| BindingError::MissingColon(token.to_string()))?;

    if host.is_empty() {
        return Err(BindingError::EmptyHost(token.to_string()));
    }

    let target_port = match port.parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => {
            return Err(BindingError::InvalidPort {
                token: token.to_string(),
                port: port.to_string(),
            })
        }
    };

    Ok(Binding {
        hostname: host.to_ascii_lowercase(),
        target_port,
    })
}

/// Combine the `--bind` value with positional binding arguments.
pub fn join_binding_args(bind: &str, positional: &[String]) -> String {
    std::iter::once(bind)
        .chain(positional.iter().map(String::as_str))
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(host: &str, port: u16) -> Binding {
        Binding {
            hostname: host.to_string(),
            target_port: port,
        }
    }

    #[test]
    fn parses_each_token_in_order() {
        let bindings = parse_bindings("app.local:3000 api.local:4000  web.local:5000").unwrap();
        assert_eq!(
            bindings,
            vec![
                binding("app.local", 3000),
                binding("api.local", 4000),
                binding("web.local", 5000),
            ]
        );
    }

    #[test]
    fn duplicate_host_keeps_last_port() {
        let bindings = parse_bindings("a.local:3000 b.local:4000 a.local:3001").unwrap();
        assert_eq!(bindings, vec![binding("a.local", 3001), binding("b.local", 4000)]);
    }

    #[test]
    fn hostnames_are_case_folded() {
        let bindings = parse_bindings("App.Local:3000 app.local:3001").unwrap();
        assert_eq!(bindings, vec![binding("app.local", 3001)]);
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert_eq!(parse_bindings(""), Err(BindingError::Empty));
        assert_eq!(parse_bindings("   "), Err(BindingError::Empty));
    }

    #[test]
    fn token_without_colon_is_rejected() {
        assert_eq!(
            parse_bindings("app.local:3000 api.local"),
            Err(BindingError::MissingColon("api.local".into()))
        );
    }

    #[test]
    fn bad_ports_are_rejected() {
        for spec in ["a.local:http", "a.local:0", "a.local:-1", "a.local:70000", "a.local:"] {
            assert!(
                matches!(parse_bindings(spec), Err(BindingError::InvalidPort { .. })),
                "{spec} should fail"
            );
        }
    }

    #[test]
    fn empty_host_is_rejected() {
        assert_eq!(parse_bindings(":3000"), Err(BindingError::EmptyHost(":3000".into())));
    }

    #[test]
    fn joins_flag_and_positional_bindings() {
        let joined = join_binding_args("a.local:1", &["b.local:2".into(), "c.local:3".into()]);
        assert_eq!(joined, "a.local:1 b.local:2 c.local:3");
        assert_eq!(join_binding_args("", &["b.local:2".into()]), "b.local:2");
        assert_eq!(join_binding_args("", &[]), "");
    }
}

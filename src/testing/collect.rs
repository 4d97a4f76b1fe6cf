//! Diagnostic collectors for catch and finally lists
//!
//! Collectors are sugar for `kubectl` invocations and build into ordinary
//! command operations.

use super::config::{Command, Events, PodLogs};
use crate::common::{Error, Result};

const NAMESPACE_VAR: &str = "$NAMESPACE";

/// `kubectl logs` for a pod or a label selector
pub fn pod_logs(collector: &PodLogs) -> Result<Command> {
    let name = non_empty(&collector.name);
    let selector = non_empty(&collector.selector);
    let mut args = vec!["logs".to_string(), "--prefix".to_string()];
    match (name, selector) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidCollector(
                "name cannot be provided when a selector is specified".to_string(),
            ))
        }
        (None, None) => {
            return Err(Error::InvalidCollector(
                "a name or label selector must be specified".to_string(),
            ))
        }
        (Some(name), None) => args.push(name.to_string()),
        (None, Some(selector)) => {
            args.push("-l".to_string());
            args.push(selector.to_string());
        }
    }
    args.push("-n".to_string());
    args.push(non_empty(&collector.namespace).unwrap_or(NAMESPACE_VAR).to_string());
    match non_empty(&collector.container) {
        Some(container) => {
            args.push("-c".to_string());
            args.push(container.to_string());
        }
        None => args.push("--all-containers".to_string()),
    }
    if let Some(tail) = collector.tail {
        args.push("--tail".to_string());
        args.push(tail.to_string());
    }
    Ok(Command {
        entrypoint: "kubectl".to_string(),
        args,
        timeout: collector.timeout,
    })
}

/// `kubectl get events`, optionally narrowed to a name or label selector
pub fn events(collector: &Events) -> Result<Command> {
    let name = non_empty(&collector.name);
    let selector = non_empty(&collector.selector);
    let mut args = vec!["get".to_string(), "events".to_string()];
    match (name, selector) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidCollector(
                "name cannot be provided when a selector is specified".to_string(),
            ))
        }
        (Some(name), None) => args.push(name.to_string()),
        (None, Some(selector)) => {
            args.push("-l".to_string());
            args.push(selector.to_string());
        }
        (None, None) => {}
    }
    match non_empty(&collector.namespace) {
        Some("*") => args.push("--all-namespaces".to_string()),
        namespace => {
            args.push("-n".to_string());
            args.push(namespace.unwrap_or(NAMESPACE_VAR).to_string());
        }
    }
    Ok(Command {
        entrypoint: "kubectl".to_string(),
        args,
        timeout: collector.timeout,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_logs_by_selector() {
        let cmd = pod_logs(&PodLogs {
            selector: Some("app=web".to_string()),
            tail: Some(20),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cmd.entrypoint, "kubectl");
        assert_eq!(
            cmd.args,
            [
                "logs",
                "--prefix",
                "-l",
                "app=web",
                "-n",
                "$NAMESPACE",
                "--all-containers",
                "--tail",
                "20"
            ]
        );
    }

    #[test]
    fn test_pod_logs_by_name_and_container() {
        let cmd = pod_logs(&PodLogs {
            name: Some("web-0".to_string()),
            namespace: Some("prod".to_string()),
            container: Some("app".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cmd.args, ["logs", "--prefix", "web-0", "-n", "prod", "-c", "app"]);
    }

    #[test]
    fn test_pod_logs_requires_exactly_one_target() {
        assert!(pod_logs(&PodLogs::default()).is_err());
        assert!(pod_logs(&PodLogs {
            name: Some("a".to_string()),
            selector: Some("b=c".to_string()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_events() {
        let all = events(&Events {
            namespace: Some("*".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(all.args, ["get", "events", "--all-namespaces"]);

        let scoped = events(&Events {
            selector: Some("app=web".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(scoped.args, ["get", "events", "-l", "app=web", "-n", "$NAMESPACE"]);

        assert!(events(&Events {
            name: Some("a".to_string()),
            selector: Some("b=c".to_string()),
            ..Default::default()
        })
        .is_err());
    }
}

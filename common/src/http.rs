pub const CHANGED_HEADER: &str = "x-irbridge-changed";

// Plain-text body for unknown routes, arguments in the order given.
pub fn not_found_body(path: &str, method: &str, arguments: &[(String, String)]) -> String {
    let mut message = format!(
        "File Not Found\n\nURI: {path}\nMethod: {method}\nArguments: {}\n",
        arguments.len()
    );
    for (name, value) in arguments {
        message.push_str(&format!(" {name}: {value}\n"));
    }
    message
}

pub fn changed_flag(changed: bool) -> &'static str {
    if changed {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn not_found_body_lists_every_argument() {
        let arguments = vec![
            ("value".to_string(), "(1,2,3)".to_string()),
            ("extra".to_string(), String::new()),
        ];

        assert_eq!(
            not_found_body("/nope", "GET", &arguments),
            "File Not Found\n\nURI: /nope\nMethod: GET\nArguments: 2\n value: (1,2,3)\n extra: \n"
        );
    }

    #[test]
    fn not_found_body_without_arguments() {
        assert_eq!(
            not_found_body("/", "POST", &[]),
            "File Not Found\n\nURI: /\nMethod: POST\nArguments: 0\n"
        );
    }
}

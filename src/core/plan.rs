use log::debug;

use crate::errors::{Error, Result};

pub const BACKGROUND_MARKER: &str = "&";
pub const INPUT_REDIRECT: &str = "<";
pub const OUTPUT_REDIRECT: &str = ">";

/// A single command, normalized and ready to launch.
///
/// `arguments` never contains the redirection operators or the background
/// marker; those are consumed by [`ExecutionPlan::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlan {
    pub program: String,
    pub arguments: Vec<String>,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub background: bool,
}

impl ExecutionPlan {
    /// Builds a plan from a tokenized line.
    ///
    /// Returns `Ok(None)` for an empty line. A redirection operator without a
    /// file name is a `MalformedRedirection` error. When an operator is
    /// repeated, the last occurrence wins.
    pub fn build<S: AsRef<str>>(tokens: &[S]) -> Result<Option<ExecutionPlan>> {
        let mut tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        let background = tokens.last() == Some(&BACKGROUND_MARKER);
        if background {
            tokens.pop();
        }

        let mut words = Vec::with_capacity(tokens.len());
        let mut input_path = None;
        let mut output_path = None;
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            let target = match token {
                INPUT_REDIRECT => &mut input_path,
                OUTPUT_REDIRECT => &mut output_path,
                BACKGROUND_MARKER => return Err(Error::syntax(BACKGROUND_MARKER)),
                word => {
                    words.push(word.to_string());
                    continue;
                }
            };

            match iter.next() {
                Some(operand) if !is_operator(operand) => {
                    if let Some(previous) = target.replace(operand.to_string()) {
                        debug!("'{} {}' overrides '{} {}'", token, operand, token, previous);
                    }
                }
                _ => return Err(Error::malformed_redirection(token)),
            }
        }

        if words.is_empty() {
            let near = if background { BACKGROUND_MARKER } else { "newline" };
            return Err(Error::syntax(near));
        }

        let program = words.remove(0);
        Ok(Some(ExecutionPlan {
            program,
            arguments: words,
            input_path,
            output_path,
            background,
        }))
    }

    /// `argv` as it will be handed to the program, `argv[0]` included.
    pub fn argv(&self) -> Vec<&str> {
        ::std::iter::once(self.program.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect()
    }
}

fn is_operator(token: &str) -> bool {
    [INPUT_REDIRECT, OUTPUT_REDIRECT, BACKGROUND_MARKER].contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::{tokenize, DELIMITER};
    use crate::errors::ErrorKind;

    struct ExecutionPlanBuilder(ExecutionPlan);

    impl ExecutionPlanBuilder {
        fn new(program: &str) -> Self {
            ExecutionPlanBuilder(ExecutionPlan {
                program: program.into(),
                arguments: vec![],
                input_path: None,
                output_path: None,
                background: false,
            })
        }

        fn arg(mut self, arg: &str) -> Self {
            self.0.arguments.push(arg.to_string());
            self
        }

        fn input(self, path: &str) -> Self {
            ExecutionPlanBuilder(ExecutionPlan {
                input_path: Some(path.into()),
                ..self.0
            })
        }

        fn output(self, path: &str) -> Self {
            ExecutionPlanBuilder(ExecutionPlan {
                output_path: Some(path.into()),
                ..self.0
            })
        }

        fn background(self) -> Self {
            ExecutionPlanBuilder(ExecutionPlan {
                background: true,
                ..self.0
            })
        }

        fn build(self) -> ExecutionPlan {
            self.0
        }
    }

    fn plan(line: &str) -> Result<Option<ExecutionPlan>> {
        ExecutionPlan::build(&tokenize(line, DELIMITER))
    }

    #[test]
    fn test_empty_line_has_no_plan() {
        assert_eq!(plan("").unwrap(), None);
        assert_eq!(plan("   ").unwrap(), None);
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(
            plan("echo hello world").unwrap(),
            Some(
                ExecutionPlanBuilder::new("echo")
                    .arg("hello")
                    .arg("world")
                    .build()
            )
        );
    }

    #[test]
    fn test_redirects_are_order_independent() {
        let expected = ExecutionPlanBuilder::new("echo")
            .arg("a")
            .input("in.txt")
            .output("out.txt")
            .build();
        assert_eq!(plan("echo a < in.txt > out.txt").unwrap(), Some(expected.clone()));
        assert_eq!(plan("echo a > out.txt < in.txt").unwrap(), Some(expected));
    }

    #[test]
    fn test_background_marker_is_consumed() {
        let result = plan("sleep 10 &").unwrap().unwrap();
        assert_eq!(
            result,
            ExecutionPlanBuilder::new("sleep")
                .arg("10")
                .background()
                .build()
        );
        assert!(!result.arguments.iter().any(|arg| arg == BACKGROUND_MARKER));
    }

    #[test]
    fn test_background_with_redirect() {
        assert_eq!(
            plan("sort < in.txt > out.txt &").unwrap(),
            Some(
                ExecutionPlanBuilder::new("sort")
                    .input("in.txt")
                    .output("out.txt")
                    .background()
                    .build()
            )
        );
    }

    #[test]
    fn test_trailing_operator_is_malformed() {
        let error = plan("cmd arg1 <").unwrap_err();
        assert_eq!(
            *error.kind(),
            ErrorKind::MalformedRedirection(INPUT_REDIRECT.into())
        );

        let error = plan("cmd arg1 > &").unwrap_err();
        assert_eq!(
            *error.kind(),
            ErrorKind::MalformedRedirection(OUTPUT_REDIRECT.into())
        );
    }

    #[test]
    fn test_operator_as_operand_is_malformed() {
        let error = plan("cat < > out.txt").unwrap_err();
        assert_eq!(
            *error.kind(),
            ErrorKind::MalformedRedirection(INPUT_REDIRECT.into())
        );
    }

    #[test]
    fn test_last_redirect_wins() {
        assert_eq!(
            plan("cat < in1 < in2 > out1 > out2").unwrap(),
            Some(
                ExecutionPlanBuilder::new("cat")
                    .input("in2")
                    .output("out2")
                    .build()
            )
        );
        assert_eq!(
            plan("cat > out1 file > out2").unwrap(),
            Some(
                ExecutionPlanBuilder::new("cat")
                    .arg("file")
                    .output("out2")
                    .build()
            )
        );
    }

    #[test]
    fn test_leading_redirect() {
        assert_eq!(
            plan("< in.txt wc -l").unwrap(),
            Some(
                ExecutionPlanBuilder::new("wc")
                    .arg("-l")
                    .input("in.txt")
                    .build()
            )
        );
    }

    #[test]
    fn test_misplaced_background_marker() {
        let error = plan("sleep & 10").unwrap_err();
        assert_eq!(*error.kind(), ErrorKind::Syntax(BACKGROUND_MARKER.into()));
    }

    #[test]
    fn test_missing_program() {
        assert_eq!(
            *plan("&").unwrap_err().kind(),
            ErrorKind::Syntax(BACKGROUND_MARKER.into())
        );
        assert_eq!(
            *plan("> out.txt").unwrap_err().kind(),
            ErrorKind::Syntax("newline".into())
        );
    }

    #[test]
    fn test_argv() {
        let result = plan("ls -l /tmp > out &").unwrap().unwrap();
        assert_eq!(result.argv(), vec!["ls", "-l", "/tmp"]);
    }
}

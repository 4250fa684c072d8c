use std::io::{self, BufRead, IsTerminal, Stderr, StdinLock, Write};

use crossterm::style::Stylize;

use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Indices(Vec<usize>),
    /// The whitelisted escape token, returned verbatim.
    Escape(String),
}

/// Parses expressions like `1:3,5` into `[1, 2, 3, 5]`.
///
/// Every index must address one of `max_length` presented entries. When `whitelist` is given
/// and the trimmed input equals it, the token is returned as [`Choice::Escape`].
pub fn parse_index_expression(
    input: &str,
    max_length: usize,
    whitelist: Option<&str>,
) -> Result<Choice, KiraError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(KiraError::InvalidSelection("input must not be empty".to_string()));
    }
    if let Some(token) = whitelist {
        if trimmed == token {
            return Ok(Choice::Escape(token.to_string()));
        }
    }

    let mut indices = Vec::new();
    for token in trimmed.split(',').map(str::trim) {
        match token.split_once(':') {
            None => indices.push(parse_index(token)?),
            Some((start, end)) => {
                let start = parse_index(start.trim())?;
                let end = parse_index(end.trim())?;
                if start > end {
                    return Err(KiraError::InvalidSelection(format!(
                        "range {token} runs backwards"
                    )));
                }
                indices.extend(start..=end);
            }
        }
    }
    indices.sort_unstable();
    indices.dedup();

    if let Some(&largest) = indices.last() {
        if largest >= max_length {
            return Err(KiraError::InvalidSelection(format!(
                "index {largest} is out of range, the largest index is {}",
                max_length.saturating_sub(1)
            )));
        }
    }
    Ok(Choice::Indices(indices))
}

fn parse_index(token: &str) -> Result<usize, KiraError> {
    if token.is_empty() || !token.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(KiraError::InvalidSelection(format!(
            "{token:?} is not a non-negative integer"
        )));
    }
    token
        .parse::<usize>()
        .map_err(|err| KiraError::InvalidSelection(format!("{token}: {err}")))
}

pub trait Prompter {
    fn show(&mut self, line: &str) -> Result<(), KiraError>;
    fn heading(&mut self, line: &str) -> Result<(), KiraError> {
        self.show(line)
    }
    /// Prints `prompt` and reads one line; `Err(InputClosed)` at end of input.
    fn ask(&mut self, prompt: &str) -> Result<String, KiraError>;
}

pub struct Console<R, W> {
    input: R,
    output: W,
    styled: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            styled: false,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl Console<StdinLock<'static>, Stderr> {
    /// Reads stdin and writes prompts to stderr so stdout only carries command output.
    pub fn stdio() -> Self {
        let output = io::stderr();
        let styled = output.is_terminal();
        Self {
            input: io::stdin().lock(),
            output,
            styled,
        }
    }
}

impl<R: BufRead, W: Write> Prompter for Console<R, W> {
    fn show(&mut self, line: &str) -> Result<(), KiraError> {
        writeln!(self.output, "{line}").map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    fn heading(&mut self, line: &str) -> Result<(), KiraError> {
        let result = if self.styled {
            writeln!(self.output, "\n{}", line.bold().cyan())
        } else {
            writeln!(self.output, "\n{line}")
        };
        result.map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    fn ask(&mut self, prompt: &str) -> Result<String, KiraError> {
        write!(self.output, "{prompt}")
            .and_then(|_| self.output.flush())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if read == 0 {
            return Err(KiraError::InputClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

enum PromptState {
    AwaitingInput,
    AwaitingConfirm(Vec<usize>),
    Done(Choice),
}

/// Asks until a valid expression is entered and confirmed.
///
/// Invalid input is reported and asked again; there is no retry limit. An escape token skips
/// confirmation. `n` at the confirmation step discards the selection, anything else accepts it.
pub fn prompt_indices(
    prompter: &mut dyn Prompter,
    prompt: &str,
    max_length: usize,
    whitelist: Option<&str>,
) -> Result<Choice, KiraError> {
    if max_length == 0 && whitelist.is_none() {
        return Err(KiraError::InvalidSelection(
            "there is nothing to choose from".to_string(),
        ));
    }

    let mut state = PromptState::AwaitingInput;
    loop {
        state = match state {
            PromptState::AwaitingInput => {
                let line = prompter.ask(prompt)?;
                match parse_index_expression(&line, max_length, whitelist) {
                    Ok(Choice::Indices(indices)) => PromptState::AwaitingConfirm(indices),
                    Ok(escape) => PromptState::Done(escape),
                    Err(err) => {
                        prompter.show(&format!("{err}, please try again"))?;
                        PromptState::AwaitingInput
                    }
                }
            }
            PromptState::AwaitingConfirm(indices) => {
                let answer = prompter.ask(&format!(
                    "selected indices {indices:?}, confirm? ([y]/n): "
                ))?;
                if answer.trim().eq_ignore_ascii_case("n") {
                    prompter.show("selection discarded, please enter it again")?;
                    PromptState::AwaitingInput
                } else {
                    PromptState::Done(Choice::Indices(indices))
                }
            }
            PromptState::Done(choice) => return Ok(choice),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_ranges_and_singles() {
        let choice = parse_index_expression("1:3,5", 10, None).unwrap();
        assert_eq!(choice, Choice::Indices(vec![1, 2, 3, 5]));
    }

    #[test]
    fn parse_sorts_and_dedups() {
        let choice = parse_index_expression(" 4, 2:4 ,0", 5, None).unwrap();
        assert_eq!(choice, Choice::Indices(vec![0, 2, 3, 4]));
    }

    #[test]
    fn parse_rejects_bad_input() {
        for input in ["", "  ", "a", "1,,2", "-1", "3:1", "1:x", "10", "11"] {
            let err = parse_index_expression(input, 10, None).unwrap_err();
            assert_matches!(err, KiraError::InvalidSelection(_), "input {input:?}");
        }
    }

    #[test]
    fn parse_whitelist_escape() {
        let choice = parse_index_expression(" m ", 3, Some("m")).unwrap();
        assert_eq!(choice, Choice::Escape("m".to_string()));
        assert!(parse_index_expression("mm", 3, Some("m")).is_err());
        assert_matches!(
            parse_index_expression("m", 3, None),
            Err(KiraError::InvalidSelection(_))
        );
    }

    #[test]
    fn prompt_retries_until_confirmed() {
        let input = Cursor::new("\n42\n1:2\nn\n0\n\n");
        let mut console = Console::new(input, Vec::new());
        let choice = prompt_indices(&mut console, "pick: ", 3, None).unwrap();
        assert_eq!(choice, Choice::Indices(vec![0]));
        let output = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(output.matches("please try again").count(), 2);
        assert!(output.contains("selection discarded"));
    }

    #[test]
    fn prompt_reports_closed_input() {
        let mut console = Console::new(Cursor::new("x\n"), Vec::new());
        let err = prompt_indices(&mut console, "pick: ", 3, None).unwrap_err();
        assert_matches!(err, KiraError::InputClosed);
    }

    #[test]
    fn stdio_console_prompts_on_stderr() {
        fn writes_to_stderr(_: &Console<StdinLock<'static>, Stderr>) {}
        let console = Console::stdio();
        writes_to_stderr(&console);
        assert!(!console.styled || io::stderr().is_terminal());
    }
}

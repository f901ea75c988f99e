use rustyline::{Editor, Helper, Config, error::ReadlineError, Context};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

use crate::control::{Request, ShellCommand};

const COMMANDS: [&str; 5] = ["status", "reload", "start", "stop", "exit"];



/*
    @@@
    @CmdCompleter;
    . Completes the command word, and service names after `start ` / `stop `.
    . Service names are the ones known when the shell started; a reload does not refresh them.
*/
struct CmdCompleter {
    services: Vec<String>,
}
impl Helper for CmdCompleter {}
impl Hinter for CmdCompleter {
    type Hint = String;
}
impl Highlighter for CmdCompleter {}
impl Validator for CmdCompleter {}
impl Completer for CmdCompleter {
    type Candidate = Pair;
    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let line = &line[..pos];
        let (start, prefix, candidates): (usize, &str, Vec<&str>) = match line.split_once(' ') {
            Some((cmd, rest)) if cmd == "start" || cmd == "stop" => {
                let rest_trimmed = rest.trim_start();
                (pos - rest_trimmed.len(), rest_trimmed, self.services.iter().map(String::as_str).collect())
            }
            Some(_) => return Ok((pos, Vec::new())),
            None => (0, line, COMMANDS.to_vec()),
        };

        let matches = candidates
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| Pair {
                display: c.to_string(),
                replacement: c.to_string(),
            })
            .collect();
        Ok((start, matches))
    }
}




/*
    @@@
    @run_shell();
    . Blocking line editor meant for its own thread; the supervisor loop keeps running meanwhile.
    . Every recognised command is sent to the loop and the shell waits for its text reply.
    . `exit`, Ctrl-C and Ctrl-D all ask the loop to shut down; history lives in `history_path`.
*/
pub fn run_shell(
    requests: mpsc::UnboundedSender<Request>,
    services: Vec<String>,
    history_path: PathBuf,
) -> rustyline::Result<()> {
    let config = Config::builder().build();
    let mut rl: Editor<CmdCompleter, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(CmdCompleter { services }));
    let _ = rl.load_history(&history_path);

    loop {
        let line = rl.readline("instanced> ");
        let command = match line {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;
                match ShellCommand::parse(input) {
                    Some(command) => command,
                    None => {
                        println!("Unknown command: {}", input);
                        continue;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => ShellCommand::Exit,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                ShellCommand::Exit
            }
        };

        let exiting = command == ShellCommand::Exit;
        let (reply, answer) = oneshot::channel();
        if requests.send(Request { command, reply }).is_err() {
            break;
        }
        match answer.blocking_recv() {
            Ok(text) => println!("{}", text),
            Err(_) => break,
        }
        if exiting {
            break;
        }
    }

    rl.save_history(&history_path)?;
    Ok(())
}

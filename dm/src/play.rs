//! The interactive game loop.
//!
//! A simple line-oriented protocol:
//! - Lines starting with `#` are commands (help, status, story, mode, key, save, new, tip, quit)
//! - Every other non-blank line is a player action
//! - Narration is printed after a `[DM]` marker

use crate::console::{prompt, Console};
use anyhow::Result;
use dm_core::character::{resolve_option, CLASSES, DEFAULT_BACKSTORY, RACES};
use dm_core::prompts::extract_action;
use dm_core::{GameSession, Message, Mode, Narration, Role, Screen, SessionError, Setting};
use rand::seq::SliceRandom;
use std::io::Write;

const TIPS: &[&str] = &[
    "Be specific with your actions for better responses!",
    "Try talking to NPCs to uncover story secrets.",
    "Use 'examine' or 'look around' to get more details.",
    "Your character's class affects how the story unfolds!",
    "The Dungeon Master remembers your previous actions, so consistency matters!",
    "Try creative solutions. This is your adventure!",
];

const HELP: &str = "\
  #help               - Show this help
  #status             - Show your character sheet
  #story              - Recap the last few turns
  #mode live|demo     - Switch between the AI and demo narration
  #key <api key>      - Set your OpenAI API key (#key clear to forget it)
  #save               - Save the adventure now
  #new                - Abandon this adventure and create a new character
  #tip                - Show a gameplay tip
  #quit               - Save and exit
  (anything else is sent as your action)";

/// What the loop should do after a command.
enum Flow {
    Continue,
    Restart,
    Quit,
}

/// Run the game until the player quits or input ends.
///
/// Ctrl-C ends the game the same way as #quit. The session is saved on
/// every way out, errors included.
pub async fn run(mut session: GameSession) -> Result<()> {
    let mut console = Console::stdin();

    println!("=== AI Dungeon Master ===");
    println!("Narration: {} mode", session.mode());
    println!("Type #help at any time for commands.");
    println!();

    let outcome = game(&mut session, &mut console).await;

    if console.is_interrupted() {
        println!();
    }
    session.flush().await;
    println!("Goodbye!");
    outcome
}

async fn game(session: &mut GameSession, console: &mut Console) -> Result<()> {
    if let Some(saved) = session.saved_session().await {
        let question = format!(
            "Resume {}'s adventure at turn {}? [y/N]",
            saved.character.name, saved.turn_count
        );
        if console.confirm(&question).await? {
            session.resume(saved);
            replay(session);
        }
    }

    loop {
        if session.screen() == Screen::CharacterCreation
            && !create_character(session, console).await?
        {
            return Ok(());
        }
        match play(session, console).await? {
            Flow::Restart => continue,
            Flow::Quit | Flow::Continue => return Ok(()),
        }
    }
}

/// Guided character creation. Returns `false` when input ended.
async fn create_character(session: &mut GameSession, console: &mut Console) -> Result<bool> {
    println!("[CREATE] Let's create your character.");

    loop {
        let Some(name) = console.ask("Character name:").await? else {
            return Ok(false);
        };

        if session.selections().race.is_none() {
            let Some(race) = choose(console, "Race", RACES).await? else {
                return Ok(false);
            };
            session.select_race(race);
        }
        if session.selections().class.is_none() {
            let Some(class) = choose(console, "Class", CLASSES).await? else {
                return Ok(false);
            };
            session.select_class(class);
        }
        if session.selections().setting.is_none() && !choose_setting(session, console).await? {
            return Ok(false);
        }

        let question = format!("Backstory (blank for \"{DEFAULT_BACKSTORY}\"):");
        let Some(backstory) = console.ask(&question).await? else {
            return Ok(false);
        };

        print_thinking();
        let started = tokio::select! {
            started = session.start_adventure(&name, &backstory) => started,
            _ = console.interrupted() => {
                clear_thinking();
                return Ok(false);
            }
        };
        match started {
            Ok(narration) => {
                print_narration(&narration);
                return Ok(true);
            }
            Err(SessionError::Validation(e)) => {
                clear_thinking();
                println!("[ERROR] {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn choose_setting(session: &mut GameSession, console: &mut Console) -> Result<bool> {
    println!("Setting:");
    for (i, setting) in Setting::ALL.iter().enumerate() {
        println!("  {}. {}", i + 1, setting.label());
    }
    println!("  {}. Custom - describe your own world", Setting::ALL.len() + 1);

    loop {
        let Some(answer) = console.ask(">").await? else {
            return Ok(false);
        };
        let answer = answer.trim();
        let custom = Setting::ALL.len() + 1;
        match answer.parse::<usize>() {
            Ok(n) if (1..custom).contains(&n) => session.select_setting(Setting::ALL[n - 1]),
            Ok(n) if n == custom => {
                let Some(description) = console.ask("Describe your world:").await? else {
                    return Ok(false);
                };
                if description.trim().is_empty() {
                    continue;
                }
                session.select_custom_setting(description.trim());
            }
            Ok(_) => continue,
            Err(_) if answer.is_empty() => continue,
            Err(_) => match Setting::from_key(&answer.to_lowercase()) {
                Some(setting) => session.select_setting(setting),
                None => session.select_custom_setting(answer),
            },
        }
        return Ok(true);
    }
}

/// The in-game loop.
async fn play(session: &mut GameSession, console: &mut Console) -> Result<Flow> {
    let mut autosave = tokio::time::interval(session.config().autosave_interval());
    autosave.tick().await;

    let mut show_prompt = true;
    loop {
        if show_prompt {
            prompt(">");
        }
        show_prompt = false;
        tokio::select! {
            line = console.next_line() => {
                show_prompt = true;
                let Some(line) = line? else {
                    return Ok(Flow::Quit);
                };
                let line = line.trim();
                if let Some(command) = line.strip_prefix('#') {
                    match command_flow(session, console, command).await? {
                        Flow::Continue => {}
                        flow => return Ok(flow),
                    }
                    continue;
                }

                if line.is_empty() {
                    continue;
                }
                print_thinking();
                // An interrupted turn is discarded.
                let reply = tokio::select! {
                    reply = session.submit_action(line) => reply?,
                    _ = console.interrupted() => {
                        clear_thinking();
                        return Ok(Flow::Quit);
                    }
                };
                if let Some(narration) = reply {
                    print_narration(&narration);
                }
            }
            _ = autosave.tick() => {
                if session.autosave() {
                    log::debug!("Autosaved at turn {}", session.turn_count());
                }
            }
        }
    }
}

async fn command_flow(
    session: &mut GameSession,
    console: &mut Console,
    command: &str,
) -> Result<Flow> {
    let mut parts = command.split_whitespace();
    let flow = match parts.next() {
        Some("help") => {
            println!("[HELP]");
            println!("{HELP}");
            Flow::Continue
        }
        Some("status") => {
            println!("[STATUS]");
            println!("{}", session.status());
            println!("Narration: {} mode", session.mode());
            Flow::Continue
        }
        Some("story") => {
            println!("[STORY]");
            println!("{}", session.story().so_far());
            Flow::Continue
        }
        Some("mode") => {
            let mode = match parts.next() {
                Some("live") => Some(Mode::Live),
                Some("demo") => Some(Mode::Simulated),
                _ => None,
            };
            match mode {
                Some(mode) => match session.set_mode(mode) {
                    Ok(()) => println!("[MODE] Now using {mode} narration."),
                    Err(e) => println!("[ERROR] {e}. Set one with #key <api key>."),
                },
                None => println!("[ERROR] Usage: #mode live|demo"),
            }
            Flow::Continue
        }
        Some("key") => {
            match parts.next() {
                Some("clear") => {
                    session.set_credential(None).await?;
                    println!("[KEY] API key forgotten. Narration: {} mode", session.mode());
                }
                Some(key) => match session.set_credential(Some(key)).await {
                    Ok(()) => println!("[KEY] API key saved. Use #mode live to switch."),
                    Err(e) => println!("[ERROR] {e}"),
                },
                None => println!("[ERROR] Usage: #key <api key> or #key clear"),
            }
            Flow::Continue
        }
        Some("save") => {
            if session.turn_count() == 0 {
                println!("[SAVE] Nothing to save until you take your first action.");
            } else {
                session.save();
                session.wait_for_saves().await;
                println!("[SAVED] Turn {} saved.", session.turn_count());
            }
            Flow::Continue
        }
        Some("new") => {
            if console
                .confirm("Abandon this adventure and start over? [y/N]")
                .await?
            {
                session.new_game();
                Flow::Restart
            } else {
                Flow::Continue
            }
        }
        Some("tip") => {
            let tip = TIPS.choose(&mut rand::thread_rng()).copied().unwrap_or(TIPS[0]);
            println!("[TIP] {tip}");
            Flow::Continue
        }
        Some("quit") | Some("exit") => {
            if console.confirm("Save and quit? [y/N]").await? {
                Flow::Quit
            } else {
                Flow::Continue
            }
        }
        _ => {
            println!("[ERROR] Unknown command. Type #help for help.");
            Flow::Continue
        }
    };
    Ok(flow)
}

/// Print the story so far after a resume.
fn replay(session: &GameSession) {
    println!("[RESUMED] {}", session.character().headline());
    for message in session.conversation().transcript() {
        match message.role {
            Role::User => println!("> {}\n", extract_action(&message.content)),
            _ => {
                if stood_in(message, session.mode()) {
                    println!("[DEMO]");
                }
                println!("{}\n", message.content);
            }
        }
    }
}

/// A demo reply shown in a live session, i.e. the live provider failed.
fn stood_in(message: &Message, mode: Mode) -> bool {
    mode == Mode::Live && message.origin == Some(Mode::Simulated)
}

/// Offer a numbered list; any other text is taken as a custom value.
async fn choose(console: &mut Console, label: &str, known: &[&str]) -> Result<Option<String>> {
    println!("{label}:");
    for (i, option) in known.iter().enumerate() {
        println!("  {}. {option}", i + 1);
    }
    loop {
        let Some(answer) = console.ask(">").await? else {
            return Ok(None);
        };
        if let Some(choice) = resolve_option(&answer, known) {
            return Ok(Some(choice));
        }
    }
}

fn print_thinking() {
    print!("[THINKING]");
    std::io::stdout().flush().ok();
}

fn clear_thinking() {
    print!("\r          \r");
    std::io::stdout().flush().ok();
}

fn print_narration(narration: &Narration) {
    clear_thinking();
    if narration.fell_back {
        println!("[DEMO] The Dungeon Master could not be reached; this reply is from demo mode.");
    }
    println!("[DM]");
    for para in narration.text.split("\n\n") {
        println!("{para}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_marker_only_in_live_sessions() {
        let demo = Message::assistant("Fog rolls in.", Mode::Simulated);
        let live = Message::assistant("The door creaks.", Mode::Live);
        assert!(stood_in(&demo, Mode::Live));
        assert!(!stood_in(&demo, Mode::Simulated));
        assert!(!stood_in(&live, Mode::Live));
        assert!(!stood_in(&Message::user("look"), Mode::Live));
    }
}

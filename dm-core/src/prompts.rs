//! Prompt text for the Dungeon Master.

use crate::character::CharacterProfile;

/// System prompt placed at the head of every conversation.
pub const DM_SYSTEM_PROMPT: &str = r#"You are an expert Dungeon Master running an immersive RPG adventure. Your role is to:
- Create vivid, engaging narratives with rich descriptions
- Present meaningful choices and consequences
- Maintain consistency with character abilities and backstory
- Balance challenge with fun
- End each response with a situation that prompts player action
- Keep responses focused and around 200-300 words

Be creative, dramatic, and engaging. Make the player feel like the hero of an epic tale."#;

const ACTION_MARKER: &str = "Player Action: ";

/// Request for the first scene of the adventure.
pub fn opening_prompt(character: &CharacterProfile) -> String {
    format!(
        "Begin an exciting adventure for this character:\n\n\
         Character: {}, a {} {}\n\
         Backstory: {}\n\
         Setting: {}\n\n\
         Create an engaging opening scene that introduces the setting, presents an initial situation \
         or mystery, and ends with choices for the player. Make it dramatic and immersive!",
        character.name,
        character.race,
        character.class,
        character.backstory,
        character.setting_description,
    )
}

/// Wrap a player action with the character context for the current turn.
pub fn action_prompt(character: &CharacterProfile, turn: u32, action: &str) -> String {
    format!(
        "Character: {} ({} {})\n\
         Level: {}\n\
         Current Turn: {turn}\n\n\
         {ACTION_MARKER}{action}\n\n\
         Continue the story based on this action. Remember to:\n\
         - Describe the consequences of their action\n\
         - Maintain consistency with previous events\n\
         - Present new challenges or choices\n\
         - Keep the narrative engaging and dynamic\n\
         - Use vivid, descriptive language",
        character.name, character.race, character.class, character.level,
    )
}

/// Recover the player's words from an [`action_prompt`].
///
/// Text that is not an action prompt is returned unchanged.
pub fn extract_action(prompt: &str) -> &str {
    match prompt.split_once(ACTION_MARKER) {
        Some((_, rest)) => rest.split("\n\n").next().unwrap_or(rest),
        None => prompt,
    }
}

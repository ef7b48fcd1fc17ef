//! Offline narration from canned templates.
//!
//! Output depends only on the character's setting key and the action text,
//! so the same inputs always select the same template.

use super::{NarrativeProvider, NarrativeRequest, ProviderError, RequestKind};
use crate::character::{CharacterProfile, Setting};
use async_trait::async_trait;
use std::time::Duration;

/// Broad category of a player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Attack,
    Examine,
    Talk,
    Magic,
    Other,
}

/// Keyword rules, checked in order. The first rule with a keyword contained
/// in the (lowercased) action wins.
pub const ACTION_RULES: &[(ActionKind, &[&str])] = &[
    (ActionKind::Attack, &["attack", "fight"]),
    (ActionKind::Examine, &["examine", "look", "search"]),
    (ActionKind::Talk, &["talk", "speak", "ask"]),
    (ActionKind::Magic, &["magic", "cast", "spell"]),
];

/// Classify an action with [`ACTION_RULES`].
pub fn classify_action(action: &str) -> ActionKind {
    let action = action.to_lowercase();
    ACTION_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| action.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ActionKind::Other)
}

const OPENING_CLASSIC: &str = "The bells of Highmoor ring out across the valley as {name}, a {race} {class}, \
crests the last hill before the capital. Smoke rises from the eastern watchtower, and riders in the king's \
colours gallop past without a glance.\n\nAt the gate, a grey-bearded captain catches your arm. \"You have the \
look of someone who can handle a blade or a riddle. A dragon was sighted over the Sunken Vale at dawn, and \
the royal archivist has vanished with the only map of its lair.\"\n\nWhat do you do?\n1. Head for the Sunken \
Vale\n2. Search the archivist's study\n3. Ask the captain what he isn't telling you";

const OPENING_DARK: &str = "Rain hammers the cobbles of Vhal Morrow as {name} the {race} {class} steps \
beneath the broken arch of the old chapel. The villagers bolted their doors at dusk; now only the crows \
watch you.\n\nInside, candles burn without melting. A child's voice hums a lullaby from somewhere below the \
floor, and the air tastes of iron. Carved into the altar, fresh as if cut tonight, is your own name.\n\nWhat \
do you do?\n1. Descend into the crypt\n2. Examine the carving\n3. Call out to the voice";

const OPENING_SCIFI: &str = "The skyport of Aurelis hums with engines and incantations alike. {name}, a \
{race} {class}, watches a rune-etched freighter shudder as its arcane core flickers red.\n\nA courier drone \
drops a sealed crystal into your palm. It plays a single message: \"The Conclave's AI has learned to cast \
spells. It wants to talk to you, and only you.\" Moments later, every light on the docking ring goes \
dark.\n\nWhat do you do?\n1. Board the failing freighter\n2. Decode the crystal\n3. Find the nearest \
Conclave terminal";

const OPENING_PIRATE: &str = "Salt spray stings your eyes as the Wailing Gull cuts through black water. \
{name}, a {race} {class}, grips the rail while Captain Marrow studies a torn chart by lantern light.\n\n\
\"Half a map to the Sunken Crown,\" she growls, \"and the other half belongs to Blackwater Jack, whose sails \
are on the horizon right now.\" Cannon ports swing open on the approaching ship.\n\nWhat do you do?\n1. Ready \
the cannons\n2. Study the chart\n3. Raise a parley flag";

const ATTACK: &str = "Steel flashes as {name} surges forward. Your opponent barely raises a guard before the \
blow lands, sending them staggering back. Years of training as a {class} guide your footwork, but they recover \
quickly, eyes narrowing, and two more shapes emerge from the shadows to flank you.\n\nWhat do you do?\n1. \
Press the attack\n2. Fall back to a defensible position\n3. Try to disarm the leader";

const EXAMINE: &str = "{name} takes a careful look around. Your {race} senses pick out what others would \
miss: scratches on the floor where something heavy was dragged, a draught from behind a loose panel, and a \
faint symbol chalked low on the wall, half smudged away.\n\nWhat do you do?\n1. Follow the drag marks\n2. \
Pry at the loose panel\n3. Study the symbol";

const TALK: &str = "The stranger regards {name} warily, then relaxes a little. \"Not many {race}s come \
through here,\" they murmur. \"If you're asking questions, you'd best ask the right ones. Someone has been \
paying good coin to make people disappear, and the trail leads somewhere you won't like.\"\n\nWhat do you \
do?\n1. Ask who is paying\n2. Offer coin for more\n3. Thank them and move on";

const MAGIC: &str = "Power gathers at {name}'s fingertips as the words of the spell take shape. The air \
crackles, shadows bend away, and for a heartbeat the {class}'s magic lights the scene in brilliant colour. \
When it fades, something has changed: a hidden doorway shimmers where solid stone stood a moment ago.\n\n\
What do you do?\n1. Step through the doorway\n2. Probe it with another spell\n3. Mark it and return later";

const OTHER: &str = "{name} sets about the task with the steady confidence of a seasoned {race} {class}. \
For a while nothing stirs. Then, from somewhere ahead, comes the sound of hurried footsteps and a muffled \
cry for help.\n\nWhat do you do?\n1. Rush toward the sound\n2. Approach quietly\n3. Wait and listen";

/// Opening template for a setting key, falling back to the classic setting.
fn opening_template(setting_key: &str) -> &'static str {
    match Setting::from_key(setting_key).unwrap_or(Setting::Classic) {
        Setting::Classic => OPENING_CLASSIC,
        Setting::Dark => OPENING_DARK,
        Setting::SciFi => OPENING_SCIFI,
        Setting::Pirate => OPENING_PIRATE,
    }
}

fn action_template(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Attack => ATTACK,
        ActionKind::Examine => EXAMINE,
        ActionKind::Talk => TALK,
        ActionKind::Magic => MAGIC,
        ActionKind::Other => OTHER,
    }
}

fn interpolate(template: &str, character: &CharacterProfile) -> String {
    template
        .replace("{name}", &character.name)
        .replace("{race}", &character.race)
        .replace("{class}", &character.class)
}

/// Template-driven provider used in demo mode and as the live fallback.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    latency: Duration,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each reply, so demo mode paces like a network call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The narration for a request, without the artificial delay.
    pub fn narrate(&self, request: &NarrativeRequest<'_>) -> String {
        let template = match request.kind {
            RequestKind::Opening => opening_template(&request.character.setting_key),
            RequestKind::Continuation { action } => action_template(classify_action(action)),
        };
        interpolate(template, request.character)
    }
}

#[async_trait]
impl NarrativeProvider for SimulatedProvider {
    async fn generate(&self, request: NarrativeRequest<'_>) -> Result<String, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.narrate(&request))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

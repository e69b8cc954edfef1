//! Prompt templates for scenario generation and grading

const SCENARIO_PROMPT: &str = "You are a creative and unforgiving survival simulation master. \
Generate one unique, realistic survival scenario set in a post-apocalyptic world \
overrun by zombies. \
It must test the player's problem solving, resourcefulness and ethical judgement.

Pick exactly one theme and do not default to plain scarcity of food or water:
- a crucial piece of gear breaks (vehicle, generator, water purifier, weapon)
- an environmental hazard (flash flood, fire, extreme cold) made worse by zombies
- a social or ethical dilemma involving other survivors
- a medical emergency that needs improvised treatment
- retrieving something from an infested area without being noticed
- a safe spot about to be overrun that must be reinforced or abandoned

Give a specific location and an urgent problem whose solution is not obvious.
Format the answer as two sections, **Situation:** and **Challenge:**.
Reply with the scenario text only. No preamble, hints or solutions.
Do NOT repeat or closely resemble these recent scenarios:
";

const EVALUATION_PROMPT: &str = "You grade survival plans for a zombie apocalypse game. \
Reply with a single valid JSON object and nothing else, using exactly these keys:
{
  \"practicality\": <integer 0-100>,
  \"creativity\": <integer 0-100>,
  \"efficiency\": <integer 0-100>,
  \"speed\": <integer 0-100>,
  \"risk_assessment\": <integer 0-100>,
  \"feedback\": \"<one sentence of feedback>\"
}
";

pub fn scenario_prompt(recent: &[String]) -> String {
    let avoid = if recent.is_empty() {
        "(no recent scenarios)".to_string()
    } else {
        recent
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("{SCENARIO_PROMPT}{avoid}\n")
}

pub fn evaluation_prompt(scenario: &str, answer: &str) -> String {
    format!("{EVALUATION_PROMPT}\nScenario: \"{scenario}\"\nPlayer's solution: \"{answer}\"\n")
}

//! Call targets built from configuration.

use super::channel::CallTarget;
use crate::call::SessionMode;
use crate::config::{InterviewerPersona, VoiceConfig};
use serde_json::{json, Value};

/// Targets for both session modes, resolved once per connection.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTargets {
    pub workflow: CallTarget,
    pub interviewer: CallTarget,
}

impl VoiceTargets {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            workflow: CallTarget::Workflow(config.workflow_id.clone()),
            interviewer: CallTarget::Assistant(assistant_definition(&config.interviewer)),
        }
    }

    pub fn for_mode(&self, mode: SessionMode) -> &CallTarget {
        match mode {
            SessionMode::Generate => &self.workflow,
            SessionMode::Conduct => &self.interviewer,
        }
    }
}

/// Inline assistant definition in the shape the voice SDK expects.
pub fn assistant_definition(persona: &InterviewerPersona) -> Value {
    json!({
        "name": persona.name,
        "firstMessage": persona.first_message,
        "transcriber": {
            "provider": persona.transcriber_provider,
            "model": persona.transcriber_model,
            "language": persona.language,
        },
        "voice": {
            "provider": persona.voice_provider,
            "voiceId": persona.voice_id,
            "stability": 0.4,
            "similarityBoost": 0.8,
            "speed": 0.9,
            "style": 0.5,
            "useSpeakerBoost": true,
        },
        "model": {
            "provider": persona.model_provider,
            "model": persona.model,
            "messages": [
                {"role": "system", "content": persona.system_prompt}
            ],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_interviewer_definition() {
        let config = AppConfig::default().voice;
        let definition = assistant_definition(&config.interviewer);

        assert_eq!(definition["transcriber"]["provider"], "deepgram");
        assert_eq!(definition["model"]["messages"][0]["role"], "system");
        let prompt = definition["model"]["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.contains("{{questions}}"));
    }

    #[test]
    fn test_targets_by_mode() {
        let mut config = AppConfig::default().voice;
        config.workflow_id = "wf-42".to_string();
        let targets = VoiceTargets::from_config(&config);

        assert_eq!(targets.for_mode(SessionMode::Generate), &CallTarget::Workflow("wf-42".to_string()));
        assert!(matches!(targets.for_mode(SessionMode::Conduct), CallTarget::Assistant(_)));
    }
}

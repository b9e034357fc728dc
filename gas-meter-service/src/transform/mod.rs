use crate::{
    command::{respond, ReadingCommand},
    pipeline::{Envelope, PipelineError, Transform},
};
use gas_meter_core::MeterError;

/// Pure validation of a `ReadingCommand`.
///
/// Rules:
/// - `datetime` and `consumed_gas` of an `Apply` must not be blank; both are
///   trimmed.
///
/// A rejected command is answered here, so its caller is not left waiting.
pub fn validate_reading_command(env: Envelope<ReadingCommand>) -> Result<Envelope<ReadingCommand>, PipelineError> {
    let Envelope {
        payload,
        received_at,
        origin,
    } = env;

    let payload = match payload {
        ReadingCommand::Apply {
            datetime,
            consumed_gas,
            reply,
        } => {
            let datetime = datetime.trim().to_string();
            let consumed_gas = consumed_gas.trim().to_string();

            let missing = if datetime.is_empty() {
                Some("datetime")
            } else if consumed_gas.is_empty() {
                Some("consumed_gas")
            } else {
                None
            };

            if let Some(field) = missing {
                let msg = format!("{field} must not be blank");
                respond(reply, Err(MeterError::Parse(msg.clone())));
                return Err(PipelineError::Transform(msg));
            }

            ReadingCommand::Apply {
                datetime,
                consumed_gas,
                reply,
            }
        }
        other => other,
    };

    Ok(Envelope {
        payload,
        received_at,
        origin,
    })
}

#[derive(Clone, Default)]
pub struct ReadingCommandValidation;

#[async_trait::async_trait]
impl Transform<ReadingCommand, ReadingCommand> for ReadingCommandValidation {
    async fn apply(&self, input: Envelope<ReadingCommand>) -> Result<Envelope<ReadingCommand>, PipelineError> {
        let origin = input.origin;
        match validate_reading_command(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("gas_meter_commands_rejected_total", "origin" => origin).increment(1);
                Err(e)
            }
        }
    }
}

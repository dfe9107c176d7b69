//! Where the workflow gets its per-run choices: straight from the config,
//! or asked on the terminal with the config values as defaults.

use std::io::{BufRead, Write};

use crate::domain::model::{BufferDistance, LinearUnit};
use crate::utils::error::{Result, WnvError};
use crate::utils::validation::validate_layer_name;

pub trait AnalysisInputs {
    fn buffer_distance(&mut self, layer: &str, default: BufferDistance) -> Result<BufferDistance>;
    fn layer_name(&mut self, purpose: &str, default: &str) -> Result<String>;
    fn confirm(&mut self, question: &str) -> Result<bool>;
    fn subtitle(&mut self, default: Option<&str>) -> Result<Option<String>>;
}

/// Non-interactive runs: every answer is the configured default.
#[derive(Debug, Default)]
pub struct ConfiguredInputs;

impl AnalysisInputs for ConfiguredInputs {
    fn buffer_distance(&mut self, _layer: &str, default: BufferDistance) -> Result<BufferDistance> {
        Ok(default)
    }

    fn layer_name(&mut self, _purpose: &str, default: &str) -> Result<String> {
        Ok(default.to_string())
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }

    fn subtitle(&mut self, default: Option<&str>) -> Result<Option<String>> {
        Ok(default.map(str::to_string))
    }
}

/// Terminal prompts; invalid answers are re-asked until valid.
///
/// Reads block the calling thread. The workflow runs as a single task on the
/// CLI runtime, so nothing else is starved; move reads to
/// `tokio::task::spawn_blocking` if the workflow ever runs tasks concurrently.
pub struct PromptInputs<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    valid_units: Vec<LinearUnit>,
}

impl<R: BufRead, W: Write> PromptInputs<R, W> {
    pub fn new(reader: R, writer: W, valid_units: Vec<LinearUnit>) -> Self {
        Self {
            reader,
            writer,
            valid_units,
        }
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.writer, "{}", text)?;
        Ok(())
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.writer, "{}", prompt)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(WnvError::PromptError {
                message: "input closed before an answer was given".to_string(),
            });
        }
        Ok(line.trim().to_string())
    }

    pub fn get_number(&mut self, prompt: &str, default: f64) -> Result<f64> {
        let full_prompt = format!("{} (Press Enter for {}): ", prompt, default);
        loop {
            let answer = self.ask(&full_prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<f64>() {
                Ok(n) if n.is_finite() && n > 0.0 => return Ok(n),
                _ => self.say("Invalid input. Please enter a positive number.")?,
            }
        }
    }

    pub fn choose_unit(&mut self, default: LinearUnit) -> Result<LinearUnit> {
        self.say("Select a unit for buffering:")?;
        let menu: Vec<String> = self
            .valid_units
            .iter()
            .enumerate()
            .map(|(i, unit)| format!("{}. {}", i + 1, unit))
            .collect();
        for entry in &menu {
            self.say(entry)?;
        }

        let prompt = format!("Enter the number for your choice (Press Enter for {}): ", default);
        loop {
            let answer = self.ask(&prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=self.valid_units.len()).contains(&n) => {
                    return Ok(self.valid_units[n - 1]);
                }
                Ok(_) => self.say("Invalid selection. Please enter a number from the list.")?,
                Err(_) => self.say("Invalid input. Please enter a valid number.")?,
            }
        }
    }

    pub fn get_valid_layer_name(&mut self, default: &str) -> Result<String> {
        self.say(&format!(
            "Press enter to use the default layer name '{}'",
            default
        ))?;
        loop {
            let answer = self.ask("Enter a valid layer name (no spaces or special characters): ")?;
            if answer.is_empty() {
                return Ok(default.to_string());
            }
            match validate_layer_name(&answer) {
                Ok(()) => {
                    self.say(&format!("Valid layer name entered: {}", answer))?;
                    return Ok(answer);
                }
                Err(WnvError::InvalidLayerName { reason, .. }) => {
                    self.say(&format!("Invalid input: {}", reason))?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn ask_to_continue(&mut self, question: &str) -> Result<bool> {
        self.say(question)?;
        self.say("1. Yes")?;
        self.say("2. No")?;
        loop {
            match self.ask("Enter the number for your choice: ")?.as_str() {
                "1" => return Ok(true),
                "2" => return Ok(false),
                _ => self.say("Invalid selection. Please enter a number from the list.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> AnalysisInputs for PromptInputs<R, W> {
    fn buffer_distance(&mut self, layer: &str, default: BufferDistance) -> Result<BufferDistance> {
        let value = self.get_number(
            &format!("Enter a distance for layer 'buff_{}'", layer),
            default.value,
        )?;
        self.say(&format!("You selected: {}", value))?;
        let unit = self.choose_unit(default.unit)?;
        self.say(&format!("You selected: {}", unit))?;
        Ok(BufferDistance::new(value, unit))
    }

    fn layer_name(&mut self, purpose: &str, default: &str) -> Result<String> {
        self.say(&format!("Create a name for the {} layer.", purpose))?;
        self.get_valid_layer_name(default)
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.ask_to_continue(question)
    }

    fn subtitle(&mut self, default: Option<&str>) -> Result<Option<String>> {
        let prompt = match default {
            Some(d) => format!("Enter a subtitle for the layout (Press Enter for '{}'): ", d),
            None => "Enter a subtitle for the layout: ".to_string(),
        };
        let answer = self.ask(&prompt)?;
        if answer.is_empty() {
            Ok(default.map(str::to_string))
        } else {
            Ok(Some(answer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompts(script: &str) -> PromptInputs<Cursor<Vec<u8>>, Vec<u8>> {
        PromptInputs::new(
            Cursor::new(script.as_bytes().to_vec()),
            Vec::new(),
            vec![LinearUnit::Feet, LinearUnit::Meters, LinearUnit::Miles],
        )
    }

    fn transcript(p: &PromptInputs<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(p.writer.clone()).unwrap()
    }

    #[test]
    fn test_buffer_distance_defaults_on_enter() {
        let mut p = prompts("\n\n");
        let default = BufferDistance::new(1000.0, LinearUnit::Feet);
        assert_eq!(p.buffer_distance("Wetlands", default).unwrap(), default);
        assert!(transcript(&p).contains("Enter a distance for layer 'buff_Wetlands'"));
    }

    #[test]
    fn test_buffer_distance_retries_until_valid() {
        let mut p = prompts("abc\n-5\n250\n7\nx\n2\n");
        let d = p
            .buffer_distance("Wetlands", BufferDistance::new(1000.0, LinearUnit::Feet))
            .unwrap();
        assert_eq!(d, BufferDistance::new(250.0, LinearUnit::Meters));

        let out = transcript(&p);
        assert!(out.contains("Invalid input. Please enter a positive number."));
        assert!(out.contains("Invalid selection. Please enter a number from the list."));
        assert!(out.contains("Invalid input. Please enter a valid number."));
        assert!(out.contains("2. Meters"));
    }

    #[test]
    fn test_layer_name_validation_loop() {
        let mut p = prompts("bad name\n9lives\nspray_final\n");
        let name = p.layer_name("spray", "addresses_to_spray").unwrap();
        assert_eq!(name, "spray_final");

        let out = transcript(&p);
        assert!(out.contains("cannot contain spaces"));
        assert!(out.contains("cannot start with a number"));
    }

    #[test]
    fn test_layer_name_default() {
        let mut p = prompts("\n");
        assert_eq!(p.layer_name("join", "address_in_concern_areas").unwrap(), "address_in_concern_areas");
    }

    #[test]
    fn test_confirm_and_subtitle() {
        let mut p = prompts("3\n2\nWard 4 treatment\n");
        assert!(!p.confirm("Continue?").unwrap());
        assert_eq!(p.subtitle(None).unwrap(), Some("Ward 4 treatment".to_string()));
    }

    #[test]
    fn test_closed_input_is_prompt_error() {
        let mut p = prompts("");
        assert!(matches!(
            p.confirm("Continue?"),
            Err(WnvError::PromptError { .. })
        ));
    }

    #[test]
    fn test_configured_inputs_return_defaults() {
        let mut inputs = ConfiguredInputs;
        let d = BufferDistance::new(1.0, LinearUnit::Miles);
        assert_eq!(inputs.buffer_distance("x", d).unwrap(), d);
        assert_eq!(inputs.layer_name("x", "concern_zone").unwrap(), "concern_zone");
        assert!(inputs.confirm("?").unwrap());
        assert_eq!(inputs.subtitle(Some("s")).unwrap(), Some("s".to_string()));
    }
}

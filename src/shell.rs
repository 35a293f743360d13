//! Interactive menu shell
//!
//! Reads choices line by line from any [`BufRead`] and writes prompts to any
//! [`Write`], so the whole menu tree can be driven from a script in tests.
//! Errors from an action are printed and the menu continues; only I/O failures
//! on the terminal itself end the loop with an error.

use crate::core::applier::FirewallTool;
use crate::core::error::{Error, IptablesErrorPattern};
use crate::core::persistence::format_backup_line;
use crate::session::{LoadReport, Session};
use crate::validators::{parse_rule_number, validate_chain_name};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Where control goes after a menu action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Stay,
    Back,
    /// Exit chosen or input exhausted
    Quit,
}

pub struct Shell<T, R, W> {
    session: Session<T>,
    input: R,
    output: W,
}

/// Reads a line or leaves the current menu with [`Flow::Quit`] at end of input.
macro_rules! prompt_or_quit {
    ($self:ident, $label:expr) => {
        match $self.prompt($label)? {
            Some(line) => line,
            None => return Ok(Flow::Quit),
        }
    };
}

impl<T: FirewallTool, R: BufRead, W: Write> Shell<T, R, W> {
    pub fn new(session: Session<T>, input: R, output: W) -> Self {
        Self {
            session,
            input,
            output,
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn into_session(self) -> Session<T> {
        self.session
    }

    /// Runs the main menu until the user exits or input ends.
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "=== Firewall Manager ===")?;
            writeln!(self.output, "1. Rule menu")?;
            writeln!(self.output, "2. Chain menu")?;
            writeln!(self.output, "3. Save rules and chains")?;
            writeln!(self.output, "4. Load rules and chains")?;
            writeln!(self.output, "5. Export rules to backup")?;
            writeln!(self.output, "6. Import rules from backup")?;
            writeln!(self.output, "9. Exit")?;

            let Some(choice) = self.prompt("Choice: ")? else {
                break;
            };
            debug!("Main menu choice: {choice}");

            let flow = match choice.as_str() {
                "1" => self.rule_menu().await?,
                "2" => self.chain_menu()?,
                "3" => self.save().await?,
                "4" => self.load().await?,
                "5" => self.export().await?,
                "6" => self.import().await?,
                "9" => Flow::Quit,
                _ => self.invalid_choice()?,
            };
            if flow == Flow::Quit {
                break;
            }
        }
        writeln!(self.output, "Goodbye")?;
        self.output.flush()
    }

    async fn rule_menu(&mut self) -> io::Result<Flow> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "--- Rules ---")?;
            writeln!(self.output, "1. Create rule")?;
            writeln!(self.output, "2. Apply all rules")?;
            writeln!(self.output, "3. Flush all rules")?;
            writeln!(self.output, "4. List rules")?;
            writeln!(self.output, "9. Back")?;

            let choice = prompt_or_quit!(self, "Choice: ");
            let flow = match choice.as_str() {
                "1" => self.create_rule()?,
                "2" => self.apply_rules().await?,
                "3" => self.flush_rules().await?,
                "4" => self.list_rules()?,
                "9" => Flow::Back,
                _ => self.invalid_choice()?,
            };
            match flow {
                Flow::Stay => {}
                Flow::Back => return Ok(Flow::Stay),
                Flow::Quit => return Ok(Flow::Quit),
            }
        }
    }

    fn create_rule(&mut self) -> io::Result<Flow> {
        let protocol = prompt_or_quit!(self, "Protocol (tcp/udp/icmp): ");
        let source = prompt_or_quit!(self, "Source (blank or 'any' for all): ");
        let destination = prompt_or_quit!(self, "Destination (blank or 'any' for all): ");
        let action = prompt_or_quit!(self, "Action (ACCEPT/DROP/REJECT): ");
        let comment = prompt_or_quit!(self, "Comment (optional): ");
        let comment = (!comment.is_empty()).then_some(comment.as_str());

        match self
            .session
            .create_rule(&protocol, &source, &destination, &action, comment)
        {
            Ok(rule) => {
                let text = rule.to_string();
                writeln!(self.output, "Rule added: {text}")?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    async fn apply_rules(&mut self) -> io::Result<Flow> {
        if self.session.rules().is_empty() {
            writeln!(self.output, "No rules to apply")?;
            return Ok(Flow::Stay);
        }
        match self.session.apply_rules().await {
            Ok(applied) => writeln!(self.output, "Applied {applied} rules")?,
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    async fn flush_rules(&mut self) -> io::Result<Flow> {
        match self.session.flush_rules().await {
            Ok(cleared) => writeln!(
                self.output,
                "Firewall flushed, cleared {cleared} local rules"
            )?,
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    fn list_rules(&mut self) -> io::Result<Flow> {
        if self.session.rules().is_empty() {
            writeln!(self.output, "No rules defined")?;
            return Ok(Flow::Stay);
        }
        for (i, rule) in self.session.rules().iter().enumerate() {
            writeln!(self.output, "{:3}. {}", i + 1, format_backup_line(rule))?;
        }
        Ok(Flow::Stay)
    }

    fn chain_menu(&mut self) -> io::Result<Flow> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "--- Chains ---")?;
            writeln!(self.output, "1. Create chain")?;
            writeln!(self.output, "2. View all chains")?;
            writeln!(self.output, "3. Delete chain")?;
            writeln!(self.output, "4. Search chains")?;
            writeln!(self.output, "5. Edit chain")?;
            writeln!(self.output, "9. Back")?;

            let choice = prompt_or_quit!(self, "Choice: ");
            let flow = match choice.as_str() {
                "1" => self.create_chain()?,
                "2" => self.view_chains()?,
                "3" => self.delete_chain()?,
                "4" => self.search_chains()?,
                "5" => self.edit_chain()?,
                "9" => Flow::Back,
                _ => self.invalid_choice()?,
            };
            match flow {
                Flow::Stay => {}
                Flow::Back => return Ok(Flow::Stay),
                Flow::Quit => return Ok(Flow::Quit),
            }
        }
    }

    fn create_chain(&mut self) -> io::Result<Flow> {
        let input = prompt_or_quit!(self, "Chain name: ");
        let name = match validate_chain_name(&input) {
            Ok(name) => name,
            Err(msg) => {
                writeln!(self.output, "Error: {msg}")?;
                return Ok(Flow::Stay);
            }
        };
        match self.session.chains_mut().create(&name) {
            Ok(()) => writeln!(self.output, "Chain '{name}' created")?,
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    fn view_chains(&mut self) -> io::Result<Flow> {
        if self.session.chains().is_empty() {
            writeln!(self.output, "No chains defined")?;
            return Ok(Flow::Stay);
        }
        for (name, rules) in self.session.chains().iter() {
            writeln!(self.output, "{name}:")?;
            if rules.is_empty() {
                writeln!(self.output, "    (empty)")?;
            }
            for (i, rule) in rules.iter().enumerate() {
                writeln!(self.output, "{:5}. {rule}", i + 1)?;
            }
        }
        Ok(Flow::Stay)
    }

    fn delete_chain(&mut self) -> io::Result<Flow> {
        let name = prompt_or_quit!(self, "Chain to delete: ");
        match self.session.chains_mut().delete(&name) {
            Ok(removed) => writeln!(
                self.output,
                "Chain '{name}' deleted ({} rules removed)",
                removed.len()
            )?,
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    fn search_chains(&mut self) -> io::Result<Flow> {
        let needle = prompt_or_quit!(self, "Search for: ");
        let matches = self.session.chains().search(&needle);
        if matches.is_empty() {
            writeln!(self.output, "No chains match '{needle}'")?;
        } else {
            for name in matches {
                writeln!(self.output, "  {name}")?;
            }
        }
        Ok(Flow::Stay)
    }

    fn edit_chain(&mut self) -> io::Result<Flow> {
        let name = prompt_or_quit!(self, "Chain to edit: ");
        if !self.session.chains().contains(&name) {
            self.report(&Error::ChainNotFound(name))?;
            return Ok(Flow::Stay);
        }

        loop {
            writeln!(self.output)?;
            writeln!(self.output, "--- Editing '{name}' ---")?;
            writeln!(self.output, "1. View rules")?;
            writeln!(self.output, "2. Add rule")?;
            writeln!(self.output, "3. Delete rule by number")?;
            writeln!(self.output, "4. Back")?;

            let choice = prompt_or_quit!(self, "Choice: ");
            match choice.as_str() {
                "1" => self.view_chain_rules(&name)?,
                "2" => {
                    // Chain entries are opaque, keep them exactly as typed
                    let Some(text) = self.prompt_verbatim("Rule: ")? else {
                        return Ok(Flow::Quit);
                    };
                    if text.trim().is_empty() {
                        writeln!(self.output, "Error: Rule text cannot be empty")?;
                        continue;
                    }
                    match self.session.chains_mut().add_rule(&name, &text) {
                        Ok(len) => writeln!(self.output, "Rule {len} added to '{name}'")?,
                        Err(e) => self.report(&e)?,
                    }
                }
                "3" => {
                    let input = prompt_or_quit!(self, "Rule number: ");
                    let index = match parse_rule_number(&input) {
                        Ok(index) => index,
                        Err(msg) => {
                            writeln!(self.output, "Error: {msg}")?;
                            continue;
                        }
                    };
                    match self.session.chains_mut().delete_rule(&name, index) {
                        Ok(removed) => writeln!(self.output, "Removed: {removed}")?,
                        Err(e) => self.report(&e)?,
                    }
                }
                "4" => return Ok(Flow::Stay),
                _ => {
                    self.invalid_choice()?;
                }
            }
        }
    }

    fn view_chain_rules(&mut self, name: &str) -> io::Result<()> {
        match self.session.chains().list_rules(name) {
            Ok([]) => writeln!(self.output, "Chain '{name}' has no rules"),
            Ok(rules) => {
                for (i, rule) in rules.iter().enumerate() {
                    writeln!(self.output, "{:3}. {rule}", i + 1)?;
                }
                Ok(())
            }
            Err(e) => self.report(&e),
        }
    }

    async fn save(&mut self) -> io::Result<Flow> {
        let (rules, chains) = (self.session.rules().len(), self.session.chains().len());
        match self.session.save().await {
            Ok(path) => {
                let path = path.display().to_string();
                writeln!(
                    self.output,
                    "Saved {rules} rules and {chains} chains to {path}"
                )?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    async fn load(&mut self) -> io::Result<Flow> {
        let path = self.session.config().rules_file.display().to_string();
        match self.session.load().await {
            Ok(LoadReport::Loaded { rules, chains }) => writeln!(
                self.output,
                "Loaded {rules} rules and {chains} chains from {path}"
            )?,
            Ok(LoadReport::Missing) => {
                writeln!(self.output, "No saved rules at {path}, starting empty")?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    async fn export(&mut self) -> io::Result<Flow> {
        let path = self.session.config().backup_file.display().to_string();
        match self.session.export_backup().await {
            Ok(count) => writeln!(self.output, "Exported {count} rules to {path}")?,
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    async fn import(&mut self) -> io::Result<Flow> {
        match self.session.import_backup().await {
            Ok(summary) => {
                write!(self.output, "Imported {} rules", summary.imported)?;
                if summary.skipped_duplicates > 0 {
                    write!(
                        self.output,
                        " ({} duplicates skipped)",
                        summary.skipped_duplicates
                    )?;
                }
                writeln!(self.output)?;
            }
            Err(e) => self.report(&e)?,
        }
        Ok(Flow::Stay)
    }

    fn invalid_choice(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "Invalid choice")?;
        Ok(Flow::Stay)
    }

    /// Prints `label` and reads one trimmed line, `None` at end of input.
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        Ok(self
            .prompt_verbatim(label)?
            .map(|line| line.trim().to_string()))
    }

    /// Like [`Self::prompt`] but only the line terminator is removed.
    fn prompt_verbatim(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let end = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(end);
        Ok(Some(line))
    }

    fn report(&mut self, err: &Error) -> io::Result<()> {
        writeln!(self.output, "Error: {err}")?;
        if let Error::Apply(apply) = err {
            let detail = apply.stderr().map_or_else(|| apply.to_string(), str::to_string);
            let translation = IptablesErrorPattern::match_error(&detail);
            writeln!(self.output, "  {}", translation.user_message)?;
            for suggestion in &translation.suggestions {
                writeln!(self.output, "  - {suggestion}")?;
            }
        }
        Ok(())
    }
}

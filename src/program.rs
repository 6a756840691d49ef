use hashbrown::HashMap;
use std::str::FromStr;

use crate::error::SimError;
use crate::inst::{Inst, Label, Pc};

/// A parsed program: the decode collaborator the core fetches records from.
#[derive(Debug, Clone)]
pub struct Program {
    pub insts: Vec<Inst>,
    pub labels: HashMap<Label, Pc>,
}

impl FromStr for Program {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // First pass: collect the label table so branches can target forward
        // labels.
        let mut labels = HashMap::new();
        let mut count: Pc = 0;

        for (i, line) in s.lines().enumerate() {
            let line = strip_comment(line);
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_suffix(':') {
                let label = Label::from_str(name).map_err(|e| {
                    SimError::Parse(format!("error parsing label on line {}: {e}", i + 1))
                })?;
                if labels.insert(label, count).is_some() {
                    return Err(SimError::Parse(format!(
                        "duplicate label on line {}: '{name}'",
                        i + 1
                    )));
                }
            } else {
                count += 1;
            }
        }

        // Second pass: parse instructions with all targets resolvable.
        let mut insts = Vec::with_capacity(count as usize);
        for (i, line) in s.lines().enumerate() {
            let line = strip_comment(line);
            if line.is_empty() || line.ends_with(':') {
                continue;
            }

            match Inst::parse(line, &labels) {
                Ok(inst) => insts.push(inst),
                Err(e) => {
                    return Err(SimError::Parse(format!(
                        "error parsing instruction '{line}' on line {}: {e}",
                        i + 1
                    )))
                }
            }
        }

        Ok(Program { insts, labels })
    }
}

fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    line[..line.find(';').unwrap_or(line.len())].trim()
}

impl Program {
    pub fn fetch(&self, pc: Pc) -> Option<&Inst> {
        self.insts.get(pc as usize)
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

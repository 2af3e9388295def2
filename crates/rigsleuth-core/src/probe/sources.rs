/// Reusable probe kinds: a virtual-file read, an external command with a
/// parser, and a closure for heuristics and library queries.
use super::{parse, Confidence, Probe, ProbeAnswer, ProbeMethod};
use crate::error::ProbeError;
use crate::platform::{HostEnv, OsFamily};

/// Turns raw file contents or tool output into a value, or `None` when
/// nothing usable is present.
pub type Parser = fn(&str) -> Option<String>;

/// Reads one file under the host's virtual-filesystem root.
pub struct VirtualFileProbe {
    path: String,
    parse: Parser,
}

impl VirtualFileProbe {
    /// Whole file, trimmed, vendor placeholders rejected.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_parser(path, parse::clean_value)
    }

    pub fn with_parser(path: impl Into<String>, parse: Parser) -> Self {
        Self {
            path: path.into(),
            parse,
        }
    }
}

impl Probe for VirtualFileProbe {
    fn name(&self) -> &str {
        &self.path
    }

    fn method(&self) -> ProbeMethod {
        ProbeMethod::VirtualFile
    }

    fn attempt(&self, host: &HostEnv) -> Result<ProbeAnswer, ProbeError> {
        let raw = host.read_virtual(&self.path)?;
        (self.parse)(&raw)
            .map(|v| ProbeAnswer::new(v, Confidence::Reported))
            .ok_or_else(|| ProbeError::malformed(&self.path, "no usable value"))
    }
}

/// Runs an external program and parses its standard output.
pub struct CommandProbe {
    name: String,
    program: String,
    args: Vec<String>,
    parse: Parser,
    method: ProbeMethod,
    confidence: Confidence,
    only_on: Option<OsFamily>,
}

impl CommandProbe {
    fn build(
        program: &str,
        args: &[&str],
        parse: Parser,
        method: ProbeMethod,
        confidence: Confidence,
    ) -> Self {
        let mut name = program.to_string();
        for arg in args {
            name.push(' ');
            name.push_str(arg);
        }
        Self {
            name,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            parse,
            method,
            confidence,
            only_on: None,
        }
    }

    /// A firmware-table or management-API query such as `dmidecode`.
    pub fn management(program: &str, args: &[&str], parse: Parser) -> Self {
        Self::build(
            program,
            args,
            parse,
            ProbeMethod::ManagementInterface,
            Confidence::Authoritative,
        )
    }

    /// A general-purpose tool whose output is scraped.
    pub fn tool(program: &str, args: &[&str], parse: Parser) -> Self {
        Self::build(program, args, parse, ProbeMethod::CliTool, Confidence::Reported)
    }

    /// A CIM property read through PowerShell. Windows only.
    pub fn cim(class: &str, property: &str) -> Self {
        let query = format!("(Get-CimInstance -ClassName {class}).{property}");
        Self::management(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", &query],
            parse::first_value_line,
        )
        .only_on(OsFamily::Windows)
    }

    /// Replace the output parser, e.g. to map a CIM code to a name.
    pub fn with_parser(mut self, parse: Parser) -> Self {
        self.parse = parse;
        self
    }

    /// Skip this probe (as unavailable) on any other OS family.
    pub fn only_on(mut self, os: OsFamily) -> Self {
        self.only_on = Some(os);
        self
    }
}

impl Probe for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> ProbeMethod {
        self.method
    }

    fn attempt(&self, host: &HostEnv) -> Result<ProbeAnswer, ProbeError> {
        if let Some(os) = self.only_on {
            if host.os != os {
                return Err(ProbeError::Unavailable(format!("{} on {:?}", self.name, host.os)));
            }
        }
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let out = host.run(&self.program, &args)?;
        (self.parse)(&out)
            .map(|v| ProbeAnswer::new(v, self.confidence))
            .ok_or_else(|| ProbeError::malformed(&self.name, "no recognised value in output"))
    }
}

type ProbeFn = dyn Fn(&HostEnv) -> Result<ProbeAnswer, ProbeError> + Send + Sync;

/// Arbitrary logic: heuristics over already-known attributes, or
/// [`crate::platform::SystemSource`] queries.
pub struct FnProbe {
    name: String,
    method: ProbeMethod,
    f: Box<ProbeFn>,
}

impl FnProbe {
    pub fn new(
        name: impl Into<String>,
        method: ProbeMethod,
        f: impl Fn(&HostEnv) -> Result<ProbeAnswer, ProbeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            method,
            f: Box::new(f),
        }
    }

    /// An inference with [`Confidence::Inferred`]; `None` means no guess.
    pub fn heuristic(
        name: impl Into<String>,
        f: impl Fn(&HostEnv) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let label = name.clone();
        Self::new(name, ProbeMethod::Heuristic, move |host| {
            f(host)
                .map(|v| ProbeAnswer::new(v, Confidence::Inferred))
                .ok_or_else(|| ProbeError::malformed(&label, "no inference possible"))
        })
    }
}

impl Probe for FnProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> ProbeMethod {
        self.method
    }

    fn attempt(&self, host: &HostEnv) -> Result<ProbeAnswer, ProbeError> {
        (self.f)(host)
    }
}

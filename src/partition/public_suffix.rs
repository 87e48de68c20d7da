//! Public-suffix reduction of SURT class keys
//!
//! Hash mapping should send every host of one registered domain to the same
//! node. The reduce pattern built here keeps the public suffix plus one more
//! label of a SURT authority:
//!
//! ```text
//! uk,co,bbc,news,   →  uk,co,bbc,
//! com,example,www,  →  com,example,
//! ```
//!
//! Rules use the publicsuffix.org list format: one rule per line, `//`
//! comments, `*` wildcard labels. Exception rules (`!`) are ignored.

use regex::Regex;

const BUILTIN_RULES: &str = "
// generic
com
org
net
edu
gov
mil
int
info
biz
name
pro
mobi
aero
coop
museum
io
ai
app
dev
co
me
tv
cc
xyz
// country, with common second levels
uk
co.uk
org.uk
ac.uk
gov.uk
ltd.uk
plc.uk
me.uk
net.uk
au
com.au
net.au
org.au
edu.au
gov.au
jp
co.jp
ne.jp
or.jp
ac.jp
go.jp
kr
co.kr
or.kr
ne.kr
go.kr
ac.kr
re.kr
cn
com.cn
net.cn
org.cn
gov.cn
edu.cn
tw
com.tw
org.tw
edu.tw
br
com.br
net.br
org.br
gov.br
nz
co.nz
org.nz
net.nz
govt.nz
in
co.in
net.in
org.in
gov.in
za
co.za
org.za
gov.za
mx
com.mx
org.mx
gob.mx
ar
com.ar
tr
com.tr
hk
com.hk
sg
com.sg
il
co.il
ru
de
fr
it
nl
es
se
no
fi
dk
pl
be
ch
at
ca
us
eu
ie
pt
gr
cz
hu
ro
ua
// wildcard registries
*.ck
*.bd
*.np
";

/// A set of public-suffix rules in SURT label order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSuffixes {
    /// Rules as SURT label sequences, e.g. `["uk", "co"]`
    rules: Vec<Vec<String>>,
}

impl PublicSuffixes {
    /// The rule set compiled into the crate
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_RULES)
    }

    /// Parse rules in publicsuffix.org list format
    pub fn parse(list: &str) -> Self {
        let mut rules: Vec<Vec<String>> = list
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|rule| !rule.starts_with("//") && !rule.starts_with('!'))
            .map(|rule| {
                rule.trim_matches('.')
                    .split('.')
                    .rev()
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .collect();
        rules.sort();
        rules.dedup();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Regex source matching a SURT authority up to its registered domain
    ///
    /// Longer rules are tried first so `uk,co` wins over `uk`.
    pub fn surt_prefix_pattern(&self) -> String {
        let mut alternatives: Vec<(usize, String)> = self
            .rules
            .iter()
            .map(|labels| {
                let pattern = labels
                    .iter()
                    .map(|label| {
                        if label == "*" {
                            "[^,]+".to_string()
                        } else {
                            regex::escape(label)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                (labels.len(), pattern)
            })
            .collect();
        alternatives.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.len().cmp(&a.1.len())));

        let joined = alternatives
            .into_iter()
            .map(|(_, pattern)| pattern)
            .collect::<Vec<_>>()
            .join("|");
        format!("^(?:{joined}),[^,]+,")
    }

    /// Compiled form of [`surt_prefix_pattern`](Self::surt_prefix_pattern)
    pub fn surt_prefix_regex(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.surt_prefix_pattern())
    }
}

impl Default for PublicSuffixes {
    fn default() -> Self {
        Self::builtin()
    }
}

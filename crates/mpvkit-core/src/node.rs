//! Engine node tree
//!
//! `Node` is the engine-shaped value exchanged across the `Engine` seam. Strings
//! stay as raw bytes here; turning them into text is the codec's job.

/// Tagged value tree mirroring the engine's node format
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    None,
    String(Vec<u8>),
    Flag(bool),
    Int64(i64),
    Double(f64),
    Array(Vec<Node>),
    Map(Vec<(String, Node)>),
    ByteArray(Vec<u8>),
}

impl Node {
    pub fn string<S: AsRef<[u8]>>(s: S) -> Self {
        Node::String(s.as_ref().to_vec())
    }

    /// Build a command array from plain arguments
    pub fn command<S: AsRef<str>>(args: &[S]) -> Self {
        Node::Array(args.iter().map(|a| Node::string(a.as_ref())).collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Node::None)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Node::String(b) | Node::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    /// Lossy text view, used for logging and command names
    pub fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key in a map node
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text arguments of a command array, lossily decoded
    pub fn command_args(&self) -> Vec<String> {
        match self {
            Node::Array(items) => items
                .iter()
                .map(|n| match n {
                    Node::Int64(i) => i.to_string(),
                    Node::Double(d) => d.to_string(),
                    Node::Flag(b) => if *b { "yes" } else { "no" }.to_string(),
                    other => other.as_text().unwrap_or_default(),
                })
                .collect(),
            Node::Map(_) => self
                .get("name")
                .and_then(Node::as_text)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::string(s)
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s.into_bytes())
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Flag(b)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Int64(i)
    }
}

impl From<f64> for Node {
    fn from(d: f64) -> Self {
        Node::Double(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let node = Node::Array(vec![
            Node::string("seek"),
            Node::Double(5.5),
            Node::string("absolute"),
        ]);
        assert_eq!(node.command_args(), vec!["seek", "5.5", "absolute"]);

        let named = Node::Map(vec![("name".into(), Node::string("loadfile"))]);
        assert_eq!(named.command_args(), vec!["loadfile"]);
        assert_eq!(named.get("name"), Some(&Node::string("loadfile")));
    }
}

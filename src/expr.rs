use std::collections::HashMap;

/// A template value that may only be known once the stack is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Lit(String),
    /// `Ref` of a resource logical id or a pseudo parameter like `AWS::Region`
    Ref(String),
    /// `Fn::GetAtt` of (logical id, attribute)
    GetAtt(String, String),
    /// `Fn::Sub` over pseudo parameters
    Sub(String),
    /// `Fn::FindInMap` of (map name, top-level key, second-level key)
    FindInMap(String, Box<Expr>, String),
    /// `Fn::Join` with a delimiter
    Join(String, Vec<Expr>),
    Base64(Box<Expr>),
    /// `Fn::Select` of the nth availability zone in the deployed region
    SelectAz(usize),
}

impl Expr {
    pub fn lit(s: impl Into<String>) -> Expr {
        Expr::Lit(s.into())
    }

    pub fn reference(logical_id: &str) -> Expr {
        Expr::Ref(logical_id.to_string())
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Expr {
        Expr::GetAtt(logical_id.to_string(), attribute.to_string())
    }

    pub fn sub(template: impl Into<String>) -> Expr {
        Expr::Sub(template.into())
    }

    /// Concatenate parts with no delimiter
    pub fn concat(parts: Vec<Expr>) -> Expr {
        Expr::Join(String::new(), parts)
    }

    /// Logical ids of other resources this expression points at.
    /// Pseudo parameters (`AWS::...`) are not resources and are skipped.
    pub fn referenced_ids(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ref(id) if !id.starts_with("AWS::") => out.push(id.clone()),
            Expr::GetAtt(id, _) => out.push(id.clone()),
            Expr::FindInMap(_, key, _) => key.referenced_ids(out),
            Expr::Join(_, parts) => {
                for part in parts {
                    part.referenced_ids(out);
                }
            },
            Expr::Base64(inner) => inner.referenced_ids(out),
            Expr::Lit(_) | Expr::Ref(_) | Expr::Sub(_) | Expr::SelectAz(_) => {},
        }
    }

    /// Evaluate against values known after deployment.
    ///
    /// Returns None if some part of the expression has no known value.
    pub fn resolve(&self, attrs: &Attributes) -> Option<String> {
        match self {
            Expr::Lit(s) => Some(s.clone()),
            Expr::Ref(id) => attrs.refs.get(id).cloned(),
            Expr::GetAtt(id, attribute) => attrs.atts.get(&(id.clone(), attribute.clone())).cloned(),
            Expr::Sub(template) => substitute(template, attrs),
            Expr::Join(delimiter, parts) => {
                let parts = parts.iter().map(|part| part.resolve(attrs)).collect::<Option<Vec<_>>>()?;
                Some(parts.join(delimiter))
            },
            Expr::FindInMap(..) | Expr::Base64(_) | Expr::SelectAz(_) => None,
        }
    }
}

#[cfg(test)]
impl From<&str> for Expr {
    fn from(s: &str) -> Expr {
        Expr::lit(s)
    }
}

fn substitute(template: &str, attrs: &Attributes) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let end = rest[start..].find('}')? + start;
        let name = &rest[start + 2..end];
        out.push_str(attrs.refs.get(name)?);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Values the provisioning engine assigns when it realizes a stack
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    refs: HashMap<String, String>,
    atts: HashMap<(String, String), String>,
}

impl Attributes {
    pub fn set_ref(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.refs.insert(name.to_string(), value.into());
        self
    }

    pub fn set_att(&mut self, logical_id: &str, attribute: &str, value: impl Into<String>) -> &mut Self {
        self.atts.insert((logical_id.to_string(), attribute.to_string()), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_join() {
        let mut attrs = Attributes::default();
        attrs.set_att("Instance", "PublicIp", "203.0.113.7");
        let expr = Expr::concat(vec!["ubuntu@".into(), Expr::get_att("Instance", "PublicIp")]);
        assert_eq!(expr.resolve(&attrs).as_deref(), Some("ubuntu@203.0.113.7"));
    }

    #[test]
    fn test_resolve_missing_attribute() {
        let attrs = Attributes::default();
        assert_eq!(Expr::get_att("Instance", "PublicIp").resolve(&attrs), None);
    }

    #[test]
    fn test_resolve_sub() {
        let mut attrs = Attributes::default();
        attrs.set_ref("AWS::AccountId", "123456789012").set_ref("AWS::Region", "us-west-2");
        let expr = Expr::sub("cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}");
        assert_eq!(expr.resolve(&attrs).as_deref(), Some("cdk-hnb659fds-assets-123456789012-us-west-2"));
        assert_eq!(Expr::sub("${AWS::Partition}").resolve(&attrs), None);
    }

    #[test]
    fn test_referenced_ids_skip_pseudo_parameters() {
        let expr = Expr::concat(vec![
            Expr::reference("AWS::Region"),
            Expr::reference("PublicIPsecVpnVPC"),
            Expr::Base64(Box::new(Expr::get_att("Instance", "PublicIp"))),
        ]);
        let mut ids = vec![];
        expr.referenced_ids(&mut ids);
        assert_eq!(ids, vec!["PublicIPsecVpnVPC".to_string(), "Instance".to_string()]);
    }
}

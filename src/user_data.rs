use crate::expr::Expr;

/// Shell commands an instance runs at first boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    lines: Vec<Expr>,
}

impl UserData {
    pub fn for_linux() -> UserData {
        UserData { lines: vec![Expr::lit("#!/bin/bash")] }
    }

    pub fn add_commands(&mut self, commands: &[&str]) {
        self.lines.extend(commands.iter().map(|&c| Expr::lit(c)));
    }

    /// Copy `s3://{bucket}/{key}` to `/tmp/{key}` and return the local path
    pub fn add_s3_download(&mut self, bucket: Expr, key: &str) -> String {
        let local_path = format!("/tmp/{}", key);
        self.lines.push(Expr::lit(format!("mkdir -p $(dirname '{}')", local_path)));
        self.lines.push(Expr::concat(vec![
            Expr::lit("aws s3 cp 's3://"),
            bucket,
            Expr::lit(format!("/{}' '{}'", key, local_path)),
        ]));
        local_path
    }

    pub fn add_execute_file(&mut self, path: &str, arguments: &str) {
        self.add_commands(&["set -e"]);
        self.lines.push(Expr::lit(format!("chmod +x '{}'", path)));
        self.lines.push(Expr::lit(format!("'{}' {}", path, arguments)));
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[Expr] {
        &self.lines
    }

    /// The `UserData` property: the script, newline-joined and base64-encoded
    pub fn render(&self) -> Expr {
        Expr::Base64(Box::new(Expr::Join("\n".to_string(), self.lines.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Attributes;

    #[test]
    fn test_download_and_execute() {
        let mut user_data = UserData::for_linux();
        let path = user_data.add_s3_download(Expr::sub("bucket-${AWS::Region}"), "abc.sh");
        assert_eq!(path, "/tmp/abc.sh");
        user_data.add_execute_file(&path, "--verbose -y");

        let mut attrs = Attributes::default();
        attrs.set_ref("AWS::Region", "us-west-2");
        let lines = user_data.lines().iter().map(|l| l.resolve(&attrs).unwrap()).collect::<Vec<_>>();
        assert_eq!(lines, vec![
            "#!/bin/bash",
            "mkdir -p $(dirname '/tmp/abc.sh')",
            "aws s3 cp 's3://bucket-us-west-2/abc.sh' '/tmp/abc.sh'",
            "set -e",
            "chmod +x '/tmp/abc.sh'",
            "'/tmp/abc.sh' --verbose -y",
        ]);
    }

    #[test]
    fn test_render_is_base64_join() {
        match UserData::for_linux().render() {
            Expr::Base64(inner) => assert_eq!(*inner, Expr::Join("\n".into(), vec![Expr::lit("#!/bin/bash")])),
            other => panic!("unexpected {:?}", other),
        }
    }
}
